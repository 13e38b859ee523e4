use config::Source;

/// Layered settings: a crate's embedded reference TOML is the lowest layer, every source added
/// through the builder overrides it.
pub trait ConfigBuilder: Sized {
    type C;

    fn add_source<T>(self, source: T) -> anyhow::Result<Self>
        where
            T: Source + Send + Sync + 'static;

    fn build(self) -> anyhow::Result<Self::C>;
}

/// Environment overrides, e.g. `FLEET__MEMBERSHIP__MACHINE_PATH=/machine`.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix("FLEET")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
