//! First-run provisioning state: lock identity and factory secret.
//!
//! Both values are created on first start and kept under the data
//! directory. The factory secret is the out-of-band value a phone needs
//! to perform initial setup; it is printed by `shackle-lockd setup-code`
//! for transfer via label or QR code.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use protocol::KeyData;
use uuid::Uuid;

/// File name of the lock identifier under the data directory.
const IDENTITY_FILE: &str = "identity";

/// File name of the factory secret under the data directory.
const FACTORY_SECRET_FILE: &str = "factory.secret";

/// Loads the lock identifier, creating one on first run.
pub fn load_or_create_identity(data_dir: &Path) -> Result<Uuid> {
    let path = data_dir.join(IDENTITY_FILE);
    if path.exists() {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read lock identity: {}", path.display()))?;
        return contents
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse lock identity: {}", path.display()));
    }

    let id = Uuid::new_v4();
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    fs::write(&path, id.to_string())
        .with_context(|| format!("Failed to write lock identity: {}", path.display()))?;
    tracing::info!("Created lock identity {}", id);
    Ok(id)
}

/// Loads the factory secret, creating one on first run.
pub fn load_or_create_factory_secret(data_dir: &Path) -> Result<KeyData> {
    let path = data_dir.join(FACTORY_SECRET_FILE);
    if path.exists() {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read factory secret: {}", path.display()))?;
        return KeyData::from_base64(contents.trim())
            .with_context(|| format!("Failed to parse factory secret: {}", path.display()));
    }

    let secret = KeyData::new();
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    fs::write(&path, secret.to_base64())
        .with_context(|| format!("Failed to write factory secret: {}", path.display()))?;
    tracing::info!("Created factory secret at {:?}", path);
    Ok(secret)
}
