//! Anonymous host machine identifier
//!
//! Stands in for the editor's own machine id when the host does not supply
//! one. The id is a salted SHA-256 of a stable local identifier, so it is
//! stable per machine but unlinkable across machines.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Get the cached machine id from `dir`, generating and caching it if absent.
pub fn get_or_generate_machine_id(dir: &Path) -> Result<String> {
    let machine_id_path = dir.join("machine_id");

    if let Ok(id) = fs::read_to_string(&machine_id_path) {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_string());
        }
    }

    let machine_id = generate_machine_id(dir)?;

    fs::create_dir_all(dir)?;
    fs::write(&machine_id_path, &machine_id)
        .with_context(|| format!("Failed to write {}", machine_id_path.display()))?;

    Ok(machine_id)
}

fn generate_machine_id(dir: &Path) -> Result<String> {
    let machine_identifier = get_machine_identifier();
    let salt = get_or_create_salt(dir)?;

    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(machine_identifier.as_bytes());
    let hash = hasher.finalize();

    Ok(format!("{:x}", hash))
}

/// MAC address, then hostname, then a random UUID
fn get_machine_identifier() -> String {
    if let Ok(Some(mac_addr)) = mac_address::get_mac_address() {
        return mac_addr.to_string();
    }

    if let Ok(hostname) = hostname::get() {
        if let Some(hostname_str) = hostname.to_str() {
            if !hostname_str.is_empty() {
                return hostname_str.to_string();
            }
        }
    }

    // Not stable across runs
    Uuid::new_v4().to_string()
}

fn get_or_create_salt(dir: &Path) -> Result<String> {
    let salt_path = dir.join("salt");

    if let Ok(salt) = fs::read_to_string(&salt_path) {
        if !salt.trim().is_empty() {
            return Ok(salt.trim().to_string());
        }
    }

    let salt = Uuid::new_v4().to_string();
    fs::create_dir_all(dir)?;
    fs::write(&salt_path, &salt).context("Failed to write salt file")?;

    Ok(salt)
}
