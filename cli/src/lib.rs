//! Argument parsing and report rendering for the `checkwright` binary.

use checkwright_license::{
    ActivationOutcome, Entitlement, LicenseConfig, LicenseManager, LicenseState,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "checkwright")]
#[command(about = "Manage the Checkwright license on this device", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Base URL of the activation authority
    #[arg(long, env = "CHECKWRIGHT_AUTHORITY_URL", global = true)]
    pub authority_url: Option<String>,

    /// Product identifier sent to the authority
    #[arg(long, env = "CHECKWRIGHT_PRODUCT", global = true)]
    pub product: Option<String>,

    /// Directory holding the license database
    #[arg(long, env = "CHECKWRIGHT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Authority request timeout in seconds
    #[arg(long, env = "CHECKWRIGHT_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Bind keys locally without contacting the authority
    #[arg(long, env = "CHECKWRIGHT_OFFLINE", global = true)]
    pub offline: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Overlays the given arguments on the default configuration.
    pub fn config(&self) -> LicenseConfig {
        let mut config = LicenseConfig::default();
        if let Some(url) = &self.authority_url {
            config.authority_url = url.clone();
        }
        if let Some(product) = &self.product {
            config.product = product.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        config.data_dir = self.data_dir.clone();
        config.offline_mode = self.offline;
        config
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the current entitlement
    Status,
    /// Activate a license key on this device
    Activate { key: String },
    /// Move a license key from another device to this one
    Transfer { key: String },
    /// Import a license file
    Import { file: PathBuf },
    /// Manage the free trial
    Trial {
        #[command(subcommand)]
        command: TrialCommand,
    },
    /// Remove the local license record
    Remove,
    /// Print entitlement changes until interrupted
    Watch {
        /// Re-check interval in seconds [default: the configured recheck interval]
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TrialCommand {
    /// Start the trial with the given key
    Start { key: String },
    /// Show the trial state
    Status,
}

/// Snapshot of the license on this device.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub entitlement: &'static str,
    pub entitled: bool,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_available: Option<bool>,
}

impl StatusReport {
    /// Reads the local state of `manager`. Never contacts the authority.
    pub fn collect(manager: &LicenseManager) -> Self {
        let entitlement = manager.entitlement();
        let mut report = Self {
            entitlement: entitlement_label(&entitlement),
            entitled: entitlement.is_entitled(),
            device_id: manager.device_id().to_string(),
            license_key: None,
            plan_type: None,
            activated_at: None,
            trial_expires_at: None,
            transfer_available: None,
        };

        match manager.state() {
            LicenseState::LicensedLocal(record) => {
                report.license_key = Some(record.license_key.masked());
                report.plan_type = record.plan_type;
                report.activated_at = Some(record.activated_at.to_rfc3339());
            }
            LicenseState::RequiresTransfer {
                license_key,
                transfer_available,
            } => {
                report.license_key = Some(license_key.masked());
                report.transfer_available = Some(transfer_available);
            }
            _ => {}
        }
        if let Entitlement::Trial { expires_at } = entitlement {
            report.trial_expires_at = Some(expires_at.to_rfc3339());
        }
        report
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Entitlement: {}", self.entitlement)?;
        writeln!(f, "  Device:      {}", self.device_id)?;
        if let Some(key) = &self.license_key {
            writeln!(f, "  Key:         {key}")?;
        }
        if let Some(plan) = &self.plan_type {
            writeln!(f, "  Plan:        {plan}")?;
        }
        if let Some(at) = &self.activated_at {
            writeln!(f, "  Activated:   {at}")?;
        }
        if let Some(at) = &self.trial_expires_at {
            writeln!(f, "  Trial ends:  {at}")?;
        }
        if let Some(available) = self.transfer_available {
            let hint = if available { "available" } else { "limit reached, contact support" };
            writeln!(f, "  Transfer:    {hint}")?;
        }
        Ok(())
    }
}

/// Interval for `watch`: the flag when given, else the configured one.
pub fn watch_interval(interval_secs: Option<u64>, config: &LicenseConfig) -> Duration {
    interval_secs.map_or_else(|| config.recheck_interval(), Duration::from_secs)
}

/// Machine-readable name of an entitlement.
pub fn entitlement_label(entitlement: &Entitlement) -> &'static str {
    match entitlement {
        Entitlement::Licensed => "licensed",
        Entitlement::Trial { .. } => "trial",
        Entitlement::RequiresTransfer { .. } => "requires_transfer",
        Entitlement::TrialExpired => "trial_expired",
        Entitlement::Unlicensed => "unlicensed",
    }
}

/// One-line human message for an authority outcome.
pub fn outcome_message(outcome: &ActivationOutcome) -> String {
    match outcome {
        ActivationOutcome::Activated { plan_type: Some(plan) } => {
            format!("License activated on this device (plan: {plan})")
        }
        ActivationOutcome::Activated { plan_type: None } => {
            "License activated on this device".to_string()
        }
        ActivationOutcome::DeviceMismatch {
            requires_transfer: true,
        } => "This key is active on another device. Run `checkwright transfer KEY` to move it here."
            .to_string(),
        ActivationOutcome::DeviceMismatch {
            requires_transfer: false,
        } => "This key is active on another device and cannot be transferred.".to_string(),
        ActivationOutcome::Invalid => "License key not recognized".to_string(),
        ActivationOutcome::Revoked => "License key has been revoked".to_string(),
        ActivationOutcome::TransferLimitReached => {
            "No transfers remain for this key. Contact support.".to_string()
        }
        ActivationOutcome::NetworkError(reason) => {
            format!("Could not reach the license server: {reason}")
        }
    }
}

/// JSON form of an authority outcome.
pub fn outcome_json(outcome: &ActivationOutcome) -> serde_json::Value {
    let mut value = serde_json::json!({
        "outcome": outcome.label(),
        "message": outcome_message(outcome),
    });
    if let ActivationOutcome::Activated {
        plan_type: Some(plan),
    } = outcome
    {
        value["plan_type"] = serde_json::Value::String(plan.clone());
    }
    value
}
