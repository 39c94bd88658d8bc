//! Infrastructure layer - external adapters (message store, filesystem, crypto).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod crypto;
pub mod messages_db;
pub mod package;
pub mod paths;
pub mod schema_probe;
pub mod secure_fs;
pub mod text_decoder;

pub use config::{ensure_config_exists, load_config, load_config_from_file, save_config_to};
pub use crypto::{decrypt_bytes, encrypt_bytes, CryptoError};
pub use messages_db::MessagesDb;
pub use package::{
    decrypt_package, encrypt_package, extract_package, Package, PackageEntry, PackageManifest,
};
pub use schema_probe::SchemaProbe;
