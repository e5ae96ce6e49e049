//! Friendly-name → package registry

use std::collections::HashMap;

/// Built-in friendly names; several names may share one package
const BUILTIN_APPS: &[(&str, &str)] = &[
    ("messages", "com.google.android.apps.messaging"),
    ("messaging", "com.google.android.apps.messaging"),
    ("sms", "com.google.android.apps.messaging"),
    ("contacts", "com.google.android.contacts"),
    ("phone", "com.google.android.dialer"),
    ("dialer", "com.google.android.dialer"),
    ("call", "com.google.android.dialer"),
    ("browser", "com.android.chrome"),
    ("chrome", "com.android.chrome"),
    ("web", "com.android.chrome"),
    ("camera", "com.android.camera2"),
    ("photo", "com.android.camera2"),
    ("settings", "com.android.settings"),
    ("setting", "com.android.settings"),
    ("config", "com.android.settings"),
    ("google pay", "com.google.android.apps.nbu.paisa.user"),
    ("pay", "com.google.android.apps.nbu.paisa.user"),
    ("gpay", "com.google.android.apps.nbu.paisa.user"),
    ("payment", "com.google.android.apps.nbu.paisa.user"),
    ("calendar", "com.google.android.calendar"),
    ("schedule", "com.google.android.calendar"),
    ("youtube", "com.google.android.youtube"),
    ("video", "com.google.android.youtube"),
    ("maps", "com.google.android.apps.maps"),
    ("map", "com.google.android.apps.maps"),
    ("google maps", "com.google.android.apps.maps"),
    ("navigation", "com.google.android.apps.maps"),
    ("gmail", "com.google.android.gm"),
    ("mail", "com.google.android.gm"),
    ("email", "com.google.android.gm"),
    ("photos", "com.google.android.apps.photos"),
    ("gallery", "com.google.android.apps.photos"),
    ("play store", "com.android.vending"),
    ("store", "com.android.vending"),
    ("play", "com.android.vending"),
    ("apps", "com.android.vending"),
    ("facebook", "com.facebook.katana"),
    ("instagram", "com.instagram.android"),
    ("whatsapp", "com.whatsapp"),
    ("twitter", "com.twitter.android"),
    ("x", "com.twitter.android"),
    ("spotify", "com.spotify.music"),
    ("music", "com.spotify.music"),
    ("netflix", "com.netflix.mediaclient"),
    ("amazon", "com.amazon.mShop.android.shopping"),
    ("calculator", "com.google.android.calculator"),
    ("clock", "com.google.android.deskclock"),
    ("alarm", "com.google.android.deskclock"),
    ("files", "com.google.android.apps.nbu.files"),
    ("file", "com.google.android.apps.nbu.files"),
    ("notes", "com.google.android.keep"),
    ("note", "com.google.android.keep"),
];

/// Immutable mapping from lowercase friendly names to package identifiers
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<String, String>,
}

impl AppRegistry {
    /// Build a registry from explicit entries
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let apps = entries
            .into_iter()
            .map(|(name, package)| (normalize(name.as_ref()), package.into()))
            .collect();
        Self { apps }
    }

    /// Registry with the built-in table
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(BUILTIN_APPS.iter().copied())
    }

    /// Built-in table overlaid with configured entries
    pub fn with_overrides<I, K, V>(extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut registry = Self::builtin();
        for (name, package) in extra {
            registry.apps.insert(normalize(name.as_ref()), package.into());
        }
        registry
    }

    /// Exact match on the lowercased, trimmed name
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.apps.get(&normalize(name)).map(String::as_str)
    }

    /// Number of friendly names
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether the registry has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Entries sorted by friendly name
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self
            .apps
            .iter()
            .map(|(name, package)| (name.as_str(), package.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup() {
        let registry = AppRegistry::new([("camera", "com.android.camera2")]);
        assert_eq!(registry.lookup("camera"), Some("com.android.camera2"));
        assert_eq!(registry.lookup("  Camera "), Some("com.android.camera2"));
        assert_eq!(registry.lookup("xyz"), None);
        // No fuzzy matching
        assert_eq!(registry.lookup("camer"), None);
        assert_eq!(registry.lookup("camera app"), None);
    }

    #[test]
    fn many_names_share_one_package() {
        let registry = AppRegistry::builtin();
        let messaging = registry.lookup("messages");
        assert_eq!(messaging, Some("com.google.android.apps.messaging"));
        assert_eq!(registry.lookup("sms"), messaging);
        assert_eq!(registry.lookup("messaging"), messaging);
    }

    #[test]
    fn multi_word_names() {
        let registry = AppRegistry::builtin();
        assert_eq!(registry.lookup("google pay"), Some("com.google.android.apps.nbu.paisa.user"));
        assert_eq!(registry.lookup("Play Store"), Some("com.android.vending"));
    }

    #[test]
    fn overrides_extend_and_replace() {
        let registry = AppRegistry::with_overrides([
            ("Work Chat", "com.slack"),
            ("music", "com.apple.android.music"),
        ]);
        assert_eq!(registry.lookup("work chat"), Some("com.slack"));
        assert_eq!(registry.lookup("music"), Some("com.apple.android.music"));
        assert_eq!(registry.lookup("spotify"), Some("com.spotify.music"));
        assert_eq!(registry.len(), AppRegistry::builtin().len() + 1);
    }

    #[test]
    fn entries_are_sorted() {
        let registry = AppRegistry::new([("b", "pkg.b"), ("a", "pkg.a")]);
        assert_eq!(registry.entries(), vec![("a", "pkg.a"), ("b", "pkg.b")]);
    }
}
