use crate::EndpointFormat;

/// Ordered mapping of endpoint URL paths to the format served there.
///
/// Lookups match the path exactly. The order of registration is the order in which discovery
/// probes a service, so the first path a service answers on wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserRegistry {
    entries: Vec<(String, EndpointFormat)>,
}

impl ParserRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a path unless it is already registered.
    pub fn register(&mut self, path: impl Into<String>, format: EndpointFormat) {
        let path = path.into();
        if self.get(&path).is_none() {
            self.entries.push((path, format));
        }
    }

    /// Returns the format registered for exactly this path.
    pub fn get(&self, path: &str) -> Option<EndpointFormat> {
        self.entries
            .iter()
            .find(|(registered, _)| registered == path)
            .map(|(_, format)| *format)
    }

    /// Iterates the registered paths in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Iterates paths and formats in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EndpointFormat)> {
        self.entries
            .iter()
            .map(|(path, format)| (path.as_str(), *format))
    }

    /// Returns the number of registered paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no path is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ParserRegistry {
    /// The well-known paths of common instrumentation libraries.
    fn default() -> Self {
        [
            ("/prometheus", EndpointFormat::Exposition),
            ("/yammer/metrics", EndpointFormat::NestedJson),
            ("/actuator/prometheus", EndpointFormat::Exposition),
            ("/metrics", EndpointFormat::FlatJson),
        ]
        .into_iter()
        .map(|(path, format)| (path.to_owned(), format))
        .collect()
    }
}

impl FromIterator<(String, EndpointFormat)> for ParserRegistry {
    fn from_iter<T: IntoIterator<Item = (String, EndpointFormat)>>(iter: T) -> Self {
        let mut registry = Self::empty();
        for (path, format) in iter {
            registry.register(path, format);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let registry = ParserRegistry::default();
        let paths: Vec<_> = registry.paths().collect();
        assert_eq!(
            paths,
            [
                "/prometheus",
                "/yammer/metrics",
                "/actuator/prometheus",
                "/metrics"
            ]
        );
    }

    #[test]
    fn test_exact_match() {
        let registry = ParserRegistry::default();
        assert_eq!(registry.get("/metrics"), Some(EndpointFormat::FlatJson));
        assert_eq!(
            registry.get("/actuator/prometheus"),
            Some(EndpointFormat::Exposition)
        );
        assert_eq!(registry.get("/metrics/"), None);
        assert_eq!(registry.get("/app/prometheus"), None);
        assert_eq!(registry.get(""), None);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = ParserRegistry::empty();
        registry.register("/stats", EndpointFormat::FlatJson);
        registry.register("/stats", EndpointFormat::NestedJson);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("/stats"), Some(EndpointFormat::FlatJson));
    }
}
