//! Licensing and activation for Checkwright.
//!
//! This module handles:
//! - License key normalization and format checking
//! - One-time activation and device transfer with the license server
//! - Hardware fingerprinting for device binding
//! - Offline entitlement checks from the local store
//! - The time-limited trial
//!
//! # Design Principles
//!
//! - **One-time activation**: Server is only contacted when the user activates or transfers
//! - **Zero phoning home**: Entitlement checks read only local state
//! - **Offline-first**: App works without network after initial activation
//! - **Device binding**: License tied to hardware fingerprint
//!
//! # License Key Format
//!
//! Keys are 16 characters from `A-Z0-9`, written as `XXXX-XXXX-XXXX-XXXX`.
//! Input with other casing, spacing or hyphenation is normalized first.
//!
//! # Security
//!
//! The local record is not signed. Anyone able to edit the license database
//! can rewrite the bound device id.

mod activation;
mod clock;
mod config;
mod device;
mod error;
#[cfg(feature = "online")]
mod http;
mod key;
mod kv;
mod manager;
mod record;
pub mod store;
mod trial;
mod watch;

pub use activation::{ActivationAuthority, ActivationOutcome, LocalAuthority};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LicenseConfig, DATABASE_FILE};
pub use device::{
    current_device_id, is_valid_device_id, DeviceFingerprint, DeviceId, DeviceIdentity,
    DeviceInfo, FixedDevice, HostDevice, DEVICE_ID_LEN,
};
pub use error::{LicenseError, LicenseResult};
pub use key::{is_valid_key_format, normalize_key, LicenseKey, KEY_GROUP_SIZE, KEY_LENGTH};
pub use kv::{KeyValueStore, KvOp, MemoryKv, SqliteKv};
pub use manager::{Entitlement, LicenseManager, LicenseState, DEFAULT_TRIAL_DAYS};
pub use record::{LicenseFile, LicenseRecord};
pub use store::LicenseStore;
pub use trial::{TrialCompanion, TrialRecord, TrialState};
pub use watch::{EntitlementWatch, MIN_RECHECK_INTERVAL};

#[cfg(feature = "online")]
pub use http::HttpAuthority;
