//! End-to-end pipeline runs against scripted external tools.

use macos_bundler_release::bundler::{
    CommandRunner, Error, Invocation, Pipeline, RecordingRunner, Result, Step, ToolOutput,
};
use macos_bundler_release::config::{NotaryCredentials, PipelineOptions, ProjectConfig};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

const IDENTITIES: &str = r#"
  1) 89ABCDEF0123456789ABCDEF0123456789ABCDEF "Developer ID Application: Example Corp (ABCDE12345)"
     1 valid identities found
"#;

/// Scripted runner that also produces the files `hdiutil` and `stapler` would.
struct ImageRunner {
    inner: RecordingRunner,
}

impl CommandRunner for ImageRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let output = self.inner.run(invocation).await?;
        let last = invocation.args.last().map(PathBuf::from);
        match (invocation.program.as_str(), invocation.args.first().map(String::as_str)) {
            ("hdiutil", Some("create")) => {
                if let Some(image) = last {
                    std::fs::write(image, b"disk image").unwrap();
                }
            }
            ("xcrun", Some("stapler")) if invocation.has_arg("staple") => {
                if let Some(image) = last {
                    let mut file = std::fs::OpenOptions::new().append(true).open(image).unwrap();
                    file.write_all(b" + ticket").unwrap();
                }
            }
            _ => {}
        }
        Ok(output)
    }

    fn require_tool(&self, program: &str, hint: &'static str) -> Result<()> {
        self.inner.require_tool(program, hint)
    }
}

struct Project {
    _tmp: tempfile::TempDir,
    config: ProjectConfig,
}

fn project(plugin_version: &str) -> Project {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let build = root.join("target/universal/release");
    std::fs::create_dir_all(&build).unwrap();
    for exe in ["menubar", "menubar-agent"] {
        std::fs::write(build.join(exe), b"\xcf\xfa\xed\xfe").unwrap();
    }
    std::fs::write(
        root.join("versions.json"),
        r#"{"app": "2.1.0", "clipboard_plugin": "1.0.2"}"#,
    )
    .unwrap();
    std::fs::create_dir_all(root.join("plugins/clipboard")).unwrap();
    std::fs::write(
        root.join("plugins/clipboard/plugin.json"),
        format!(r#"{{"name": "clipboard", "version": "{plugin_version}"}}"#),
    )
    .unwrap();
    std::fs::write(root.join("plugins/clipboard/main.js"), "export {}").unwrap();

    let config = ProjectConfig::from_toml(
        r#"
        app_name = "MenuBar"
        bundle_identifier = "com.example.menubar"
        main_executable = "menubar"
        helpers = ["menubar-agent"]
        version_manifest = "versions.json"

        [[plugins]]
        name = "clipboard"
        source = "plugins/clipboard"
        version_key = "clipboard_plugin"
        "#,
        root,
    )
    .unwrap();
    Project { _tmp: tmp, config }
}

fn sha256_hex(path: &Path) -> String {
    hex::encode(Sha256::digest(std::fs::read(path).unwrap()))
}

#[tokio::test]
async fn test_local_release_produces_adhoc_signed_image_and_checksum() {
    let project = project("1.0.2");
    let options = PipelineOptions {
        skip_build: true,
        version_override: Some("v2.1.0".into()),
        ..Default::default()
    };
    let runner = ImageRunner {
        inner: RecordingRunner::new(),
    };

    let mut seen = Vec::new();
    let state = Pipeline::new(&runner, &project.config, &options)
        .run_with(|step| seen.push(step))
        .await
        .unwrap();

    assert_eq!(
        seen,
        [Step::Assemble, Step::AdhocSign, Step::Dmg, Step::Checksum]
    );

    let bundle = state.bundle.as_ref().unwrap();
    let contents = bundle.path.join("Contents");
    assert!(contents.join("MacOS/menubar").is_file());
    assert!(contents.join("MacOS/menubar-agent").is_file());
    assert!(contents.join("Resources/plugins/clipboard/plugin.json").is_file());
    assert_eq!(state.version.as_ref().unwrap().bundle_version, "210");

    let image = state.image.as_ref().unwrap();
    assert_eq!(image.file_name().unwrap(), "MenuBar-2.1.0.dmg");
    let checksum = std::fs::read_to_string(state.checksum.as_ref().unwrap()).unwrap();
    assert_eq!(checksum, format!("{}  MenuBar-2.1.0.dmg\n", sha256_hex(image)));

    // No Developer ID work in a local build
    assert!(runner.inner.calls_to("security").is_empty());
    assert!(runner.inner.calls_to("xcrun").is_empty());
    assert!(
        runner
            .inner
            .calls_to("codesign")
            .iter()
            .filter(|c| c.has_arg("--sign"))
            .all(|c| c.has_arg("-") && !c.has_arg("runtime"))
    );
}

#[tokio::test]
async fn test_signed_release_checksums_the_stapled_image() {
    let project = project("1.0.2");
    let options = PipelineOptions {
        enable_signing: true,
        skip_build: true,
        version_override: Some("2.1.0".into()),
        credentials: Some(NotaryCredentials::AppleId {
            apple_id: "dev@example.com".into(),
            team_id: "ABCDE12345".into(),
            password: "abcd-efgh-ijkl-mnop".into(),
        }),
        ..Default::default()
    };
    let runner = ImageRunner {
        inner: RecordingRunner::new()
            .respond_to("security", "find-identity", ToolOutput::ok(IDENTITIES))
            .respond_to(
                "xcrun",
                "notarytool",
                ToolOutput::ok(concat!(
                    r#"{"id":"7c1d3a9e-0b7e-4a53-9f4c-1f6f0e0a2b11","#,
                    r#""status":"Accepted","message":"ok"}"#,
                )),
            ),
    };

    let state = Pipeline::new(&runner, &project.config, &options)
        .run()
        .await
        .unwrap();

    assert!(state.submission.as_ref().unwrap().is_accepted());
    assert_eq!(
        state.identity.as_deref(),
        Some("Developer ID Application: Example Corp (ABCDE12345)")
    );

    let image = state.image.as_ref().unwrap();
    assert_eq!(std::fs::read(image).unwrap(), b"disk image + ticket");
    let checksum = std::fs::read_to_string(state.checksum.as_ref().unwrap()).unwrap();
    assert!(checksum.starts_with(&sha256_hex(image)));

    // Identity is resolved once and reused for the image
    assert_eq!(runner.inner.calls_to("security").len(), 1);
    let signs: Vec<_> = runner
        .inner
        .calls_to("codesign")
        .into_iter()
        .filter(|c| c.has_arg("--sign"))
        .collect();
    assert!(signs.iter().all(|c| c.has_arg("--timestamp")));
    assert_eq!(
        signs.last().and_then(|c| c.args.last()).map(PathBuf::from).as_ref(),
        Some(image)
    );
}

#[tokio::test]
async fn test_plugin_mismatch_stops_before_anything_is_written() {
    let project = project("1.0.1");
    let options = PipelineOptions {
        skip_build: true,
        version_override: Some("2.1.0".into()),
        ..Default::default()
    };
    let runner = ImageRunner {
        inner: RecordingRunner::new(),
    };

    let err = Pipeline::new(&runner, &project.config, &options)
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("assemble step failed"));
    assert!(!project.config.bundle_path().exists());
    assert!(!project.config.dist_dir().exists());
    assert!(runner.inner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_notary_credentials_abort_before_any_step() {
    let project = project("1.0.2");
    let options = PipelineOptions {
        enable_signing: true,
        skip_build: true,
        version_override: Some("2.1.0".into()),
        ..Default::default()
    };
    let runner = ImageRunner {
        inner: RecordingRunner::new()
            .respond_to("security", "find-identity", ToolOutput::ok(IDENTITIES)),
    };

    let mut seen = Vec::new();
    let err = Pipeline::new(&runner, &project.config, &options)
        .run_with(|step| seen.push(step))
        .await
        .unwrap_err();

    match &err {
        Error::MissingCredentials { missing } => assert!(missing.contains(&"APPLE_ID".to_string())),
        other => panic!("unexpected error: {other}"),
    }
    assert!(seen.is_empty());
    assert!(!project.config.bundle_path().exists());
    assert!(runner.inner.calls_to("security").is_empty());
    assert!(runner.inner.calls_to("codesign").is_empty());
    assert!(runner.inner.calls_to("hdiutil").is_empty());
}
