//! Configuration access port trait.

use crate::domain::error::StsError;

/// Sectioned key/value configuration, INI style.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Like [`ConfigPort::get_string`], but a missing key is an error.
    fn require_string(&self, section: &str, key: &str) -> Result<String, StsError> {
        self.get_string(section, key)
            .ok_or_else(|| StsError::ConfigMissing {
                section: section.into(),
                key: key.into(),
            })
    }
}
