pub mod config;
pub mod replay;

use std::path::PathBuf;

use log::warn;
use qns::tracker::iwlan::CountryCodeStore;

/// File-backed persistence for the last-known Wi-Fi country code.
pub struct FileCountryCodeStore {
    path: PathBuf,
}

impl FileCountryCodeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCountryCodeStore { path: path.into() }
    }
}

impl CountryCodeStore for FileCountryCodeStore {
    fn save(&self, code: &str) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&self.path, code) {
            warn!("failed to persist country code: {e}");
        }
    }

    fn load(&self) -> Option<String> {
        let code = std::fs::read_to_string(&self.path).ok()?;
        let code = code.trim();
        if code.is_empty() {
            None
        } else {
            Some(code.to_string())
        }
    }
}
