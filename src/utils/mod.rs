pub mod activation;
pub mod loss;

pub use activation::Activation;

/// Whether a scalar metric went astray (NaN or infinite).
pub fn is_nan_or_inf(value: f64) -> bool {
    !value.is_finite()
}

/// Output length of a `(pool, 1)` max-pool with stride `pool` over `len` steps.
pub fn pooled_len(len: usize, pool: usize) -> usize {
    if pool <= 1 { len } else { len / pool }
}
