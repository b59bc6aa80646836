//! IO modules - filesystem side effects

pub mod chunked;
pub mod hashing;
