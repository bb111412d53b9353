//! # img2ftps
//!
//! Uploads batches of images to an FTPS server:
//!   • Magic-byte validation (GIF87a / GIF89a / PNG / JPEG) with a size cap
//!   • One-shot remote directory ensure (NLST + MKD) per batch
//!   • Concurrency-bounded STOR uploads with typed per-file outcomes
//!   • Explicit & implicit FTPS over rustls with a scoped trust policy
//!   • Idle session reuse between uploads

pub mod ftps;

pub use ftps::*;
