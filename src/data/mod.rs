pub mod batcher;
pub mod dataset;
pub mod features;
pub mod synthetic;
pub mod text;
pub mod uci_hapt;
pub mod uci_har;

pub use batcher::{HarBatch, HarBatcher};
pub use dataset::{HarDataset, HarItem, HarShape, HarSplits};
pub use features::Orientation;
pub use synthetic::SyntheticOptions;
pub use uci_hapt::UciHaptOptions;
pub use uci_har::UciHarOptions;

/// The datasets a model can be trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DatasetKind {
    UciHar,
    UciHapt,
    Synthetic,
}

impl std::str::FromStr for DatasetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "uci-har" | "har" => Ok(DatasetKind::UciHar),
            "uci-hapt" | "hapt" => Ok(DatasetKind::UciHapt),
            "synthetic" => Ok(DatasetKind::Synthetic),
            other => anyhow::bail!(
                "unknown dataset {other:?}, expected one of uci-har, uci-hapt, synthetic"
            ),
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatasetKind::UciHar => "uci-har",
            DatasetKind::UciHapt => "uci-hapt",
            DatasetKind::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_kind_accepts_short_names() {
        assert_eq!(DatasetKind::UciHapt, "HAPT".parse::<DatasetKind>().unwrap());
        assert_eq!(DatasetKind::UciHar, "uci_har".parse::<DatasetKind>().unwrap());
        assert_eq!("synthetic", DatasetKind::Synthetic.to_string());
        assert!("mnist".parse::<DatasetKind>().is_err());
    }
}
