//! `Info.plist` generation.

use crate::bundler::error::{Error, Result};
use plist::{Dictionary, Value};

/// Identity fields that change per release.
#[derive(Debug, Clone)]
pub struct BundleIdentity<'a> {
    /// `CFBundleName` / `CFBundleDisplayName`
    pub app_name: &'a str,
    /// `CFBundleIdentifier`
    pub bundle_identifier: &'a str,
    /// `CFBundleShortVersionString`
    pub version: &'a str,
    /// `CFBundleVersion`, digits only
    pub bundle_version: &'a str,
}

/// Metadata fixed by the project configuration.
#[derive(Debug, Clone)]
pub struct DescriptorMetadata<'a> {
    /// `CFBundleExecutable`
    pub executable: &'a str,
    /// `LSMinimumSystemVersion`
    pub minimum_system_version: &'a str,
    /// `CFBundleIconFile`, when an icon is bundled
    pub icon_file: Option<&'a str>,
    /// `SUFeedURL`
    pub feed_url: Option<&'a str>,
    /// `SUPublicEDKey`
    pub public_ed_key: Option<&'a str>,
}

/// Render the XML property list for a bundle.
///
/// Pure: the same inputs always produce the same text.
pub fn render(identity: &BundleIdentity<'_>, meta: &DescriptorMetadata<'_>) -> Result<String> {
    if identity.bundle_version.is_empty()
        || !identity.bundle_version.chars().all(|c| c.is_ascii_digit())
    {
        return Err(Error::GenericError(format!(
            "CFBundleVersion must be digits only, got '{}'",
            identity.bundle_version
        )));
    }

    let mut dict = Dictionary::new();
    dict.insert("CFBundleDevelopmentRegion".into(), "en".into());
    dict.insert("CFBundleName".into(), identity.app_name.into());
    dict.insert("CFBundleDisplayName".into(), identity.app_name.into());
    dict.insert("CFBundleIdentifier".into(), identity.bundle_identifier.into());
    dict.insert("CFBundleExecutable".into(), meta.executable.into());
    dict.insert("CFBundleInfoDictionaryVersion".into(), "6.0".into());
    dict.insert("CFBundlePackageType".into(), "APPL".into());
    dict.insert("CFBundleShortVersionString".into(), identity.version.into());
    dict.insert("CFBundleVersion".into(), identity.bundle_version.into());
    if let Some(icon) = meta.icon_file {
        dict.insert("CFBundleIconFile".into(), icon.into());
    }
    dict.insert("LSMinimumSystemVersion".into(), meta.minimum_system_version.into());
    // Menu-bar agent: no Dock icon
    dict.insert("LSUIElement".into(), true.into());
    dict.insert("NSHighResolutionCapable".into(), true.into());
    if let Some(feed) = meta.feed_url {
        dict.insert("SUFeedURL".into(), feed.into());
        dict.insert("SUEnableAutomaticChecks".into(), true.into());
    }
    if let Some(key) = meta.public_ed_key {
        dict.insert("SUPublicEDKey".into(), key.into());
    }

    let mut out = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut out)?;
    String::from_utf8(out).map_err(|e| Error::GenericError(format!("plist is not UTF-8: {e}")))
}

/// Read `CFBundleVersion` from an existing `Info.plist`, if any.
pub fn read_bundle_version(plist_path: &std::path::Path) -> Option<String> {
    let value = Value::from_file(plist_path).ok()?;
    value
        .as_dictionary()?
        .get("CFBundleVersion")?
        .as_string()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BundleIdentity<'static> {
        BundleIdentity {
            app_name: "Example",
            bundle_identifier: "com.example.app",
            version: "1.3.0-beta.4",
            bundle_version: "13004",
        }
    }

    fn meta() -> DescriptorMetadata<'static> {
        DescriptorMetadata {
            executable: "example",
            minimum_system_version: "13.0",
            icon_file: Some("AppIcon"),
            feed_url: Some("https://example.com/appcast.xml"),
            public_ed_key: Some("pfIShU4dEXqPd5ObYNfDBiQWcXozk7estwzTnF9BamQ="),
        }
    }

    #[test]
    fn test_render_embeds_identity_and_metadata() {
        let xml = render(&identity(), &meta()).unwrap();
        let value = Value::from_reader_xml(xml.as_bytes()).unwrap();
        let dict = value.as_dictionary().unwrap();

        let s = |k: &str| dict.get(k).and_then(Value::as_string).unwrap().to_string();
        assert_eq!(s("CFBundleIdentifier"), "com.example.app");
        assert_eq!(s("CFBundleShortVersionString"), "1.3.0-beta.4");
        assert_eq!(s("CFBundleVersion"), "13004");
        assert_eq!(s("LSMinimumSystemVersion"), "13.0");
        assert_eq!(s("SUFeedURL"), "https://example.com/appcast.xml");
        assert_eq!(dict.get("LSUIElement").and_then(Value::as_boolean), Some(true));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(
            render(&identity(), &meta()).unwrap(),
            render(&identity(), &meta()).unwrap()
        );
    }

    #[test]
    fn test_update_keys_omitted_without_feed() {
        let meta = DescriptorMetadata {
            feed_url: None,
            public_ed_key: None,
            icon_file: None,
            ..meta()
        };
        let xml = render(&identity(), &meta).unwrap();
        assert!(!xml.contains("SUFeedURL"));
        assert!(!xml.contains("CFBundleIconFile"));
    }

    #[test]
    fn test_non_numeric_bundle_version_rejected() {
        let identity = BundleIdentity {
            bundle_version: "1.3.0",
            ..identity()
        };
        assert!(render(&identity, &meta()).is_err());
    }

    #[test]
    fn test_read_bundle_version_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Info.plist");
        std::fs::write(&path, render(&identity(), &meta()).unwrap()).unwrap();
        assert_eq!(read_bundle_version(&path).as_deref(), Some("13004"));
        assert_eq!(read_bundle_version(&tmp.path().join("missing.plist")), None);
    }
}
