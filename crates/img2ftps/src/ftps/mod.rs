//! # FTPS image upload pipeline
//!
//! Architecture:
//! - `types`: config, file items, jobs, outcomes
//! - `error`: FTPS-specific error type
//! - `validator`: magic-byte signature checks
//! - `protocol`: low-level command/response codec
//! - `tls`: rustls connector and trust policies
//! - `connection`: TCP + TLS control connection
//! - `transfer`: passive data channel
//! - `client`: stateful FTPS client (login, NLST, MKD, STOR)
//! - `pool`: idle session reuse
//! - `transport`: `FtpsTransport` seam + pooled implementation
//! - `directory`: remote directory ensure
//! - `dispatcher`: permit-bounded upload tasks
//! - `uploader`: high-level facade

pub mod types;
pub mod error;
pub mod validator;
pub mod protocol;
pub mod tls;
pub mod connection;
pub mod transfer;
pub mod client;
pub mod pool;
pub mod transport;
pub mod directory;
pub mod dispatcher;
pub mod uploader;

pub use types::*;
pub use error::{FtpsError, FtpsErrorKind, FtpsResult};
pub use pool::FtpsSessionPool;
pub use transport::FtpsTransport;
pub use uploader::ImageUploader;
pub use validator::is_valid_image;
