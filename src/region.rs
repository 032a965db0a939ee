use std::env;

/// Label fallback when the hosting environment does not expose a region
pub const UNKNOWN_REGION: &str = "unknown";

/// Supplies the serving-location label attached to every measurement.
///
/// Handlers ask for the label once per request, so swapping the provider is
/// all a test needs to control what ends up in the `region` field.
pub trait RegionProvider: Send + Sync {
    fn region_label(&self) -> String;
}

/// Reads the label from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvRegion {
    var: String,
    fallback: String,
}

impl EnvRegion {
    pub fn new<V: Into<String>, F: Into<String>>(var: V, fallback: F) -> Self {
        Self {
            var: var.into(),
            fallback: fallback.into(),
        }
    }
}

impl RegionProvider for EnvRegion {
    fn region_label(&self) -> String {
        match env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => self.fallback.clone(),
        }
    }
}

/// Always returns the same label
#[derive(Debug, Clone)]
pub struct FixedRegion(pub String);

impl RegionProvider for FixedRegion {
    fn region_label(&self) -> String {
        self.0.clone()
    }
}
