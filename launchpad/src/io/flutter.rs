//! Platform builds driven by the flutter toolchain.
//!
//! Each step runs one tool, fails on a non-zero exit, and recovers the value
//! it needs from the raw output through an artifact cascade.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::artifact::{ArtifactKind, resolve};
use crate::core::error::StepError;
use crate::core::types::Platform;
use crate::io::process::{ProcessRequest, ProcessRunner, run_tool};

const IOS_WORKSPACE: &str = "ios/Runner.xcworkspace";
const DEFAULT_SCHEME: &str = "Runner";

/// What to build and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub platform: Platform,
    /// Directory containing the application's `pubspec.yaml`.
    pub app_root: PathBuf,
    pub flavor: Option<String>,
    /// iOS export only.
    pub provisioning_profile: Option<String>,
    /// Working directory for `fastlane export`. Defaults to `app_root`.
    pub fastlane_dir: Option<PathBuf>,
}

impl BuildRequest {
    pub fn new(platform: Platform, app_root: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            app_root: app_root.into(),
            flavor: None,
            provisioning_profile: None,
            fastlane_dir: None,
        }
    }

    fn scheme(&self) -> &str {
        self.flavor.as_deref().unwrap_or(DEFAULT_SCHEME)
    }

    fn flutter_build(&self, target: &str) -> ProcessRequest {
        let request = ProcessRequest::new("flutter", &self.app_root).args(["build", target]);
        match &self.flavor {
            Some(flavor) => request.args(["--flavor", flavor.as_str()]),
            None => request,
        }
    }
}

/// Build the platform artifact and return its path.
#[instrument(
    skip_all,
    fields(platform = %request.platform, app_root = %request.app_root.display())
)]
pub fn build<R: ProcessRunner>(runner: &R, request: &BuildRequest) -> Result<PathBuf> {
    match request.platform {
        Platform::Android => build_android(runner, request),
        Platform::Ios => build_ios(runner, request),
    }
}

fn build_android<R: ProcessRunner>(runner: &R, request: &BuildRequest) -> Result<PathBuf> {
    info!("building app bundle");
    let output = run_tool(runner, &request.flutter_build("appbundle"))?;
    let bundle = extract(&output.combined(), ArtifactKind::PackageBundle)?;
    Ok(anchor(&request.app_root, &bundle))
}

fn build_ios<R: ProcessRunner>(runner: &R, request: &BuildRequest) -> Result<PathBuf> {
    let app_root = &request.app_root;
    let ios_dir = app_root.join("ios");
    if ios_dir.join("Podfile").is_file() {
        info!("installing pods");
        run_tool(
            runner,
            &ProcessRequest::new("pod", &ios_dir).args(["install", "--repo-update"]),
        )?;
    }

    let settings = run_tool(
        runner,
        &ProcessRequest::new("xcodebuild", app_root).args([
            "-showBuildSettings",
            "-workspace",
            IOS_WORKSPACE,
            "-scheme",
            request.scheme(),
        ]),
    )?;
    let bundle_id = extract(&settings.stdout, ArtifactKind::Identifier)?;
    info!(%bundle_id, "resolved bundle identifier");

    info!("building archive");
    let output = run_tool(runner, &request.flutter_build("ipa"))?;
    let archive = anchor(app_root, &extract(&output.combined(), ArtifactKind::Archive)?);
    let output_dir = archive.parent().unwrap_or(app_root.as_path());

    let export_dir = request.fastlane_dir.as_deref().unwrap_or(app_root.as_path());
    let mut export = ProcessRequest::new("fastlane", export_dir)
        .arg("export")
        .arg(format!("workspace:{}", app_root.join(IOS_WORKSPACE).display()))
        .arg(format!("scheme:{}", request.scheme()))
        .arg(format!("archive_path:{}", archive.display()))
        .arg(format!("output_directory:{}", output_dir.display()))
        .arg(format!("bundle_id:{bundle_id}"));
    if let Some(profile) = &request.provisioning_profile {
        export = export.arg(format!("provisioning_profile:{profile}"));
    }
    info!("exporting ipa");
    let output = run_tool(runner, &export)?;
    let ipa = extract(&output.combined(), ArtifactKind::Export)?;
    Ok(anchor(export_dir, &ipa))
}

fn extract(output: &str, kind: ArtifactKind) -> Result<String, StepError> {
    resolve(output, kind).ok_or(StepError::Extraction { kind })
}

/// Tools report paths relative to where they ran.
fn anchor(base: &Path, reported: &str) -> PathBuf {
    let path = Path::new(reported);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{ScriptedRunner, failed_output, ok_output};

    const GRADLE_OUTPUT: &str = "Running Gradle task 'bundleRelease'...\n\
        Font asset \"MaterialIcons-Regular.otf\" was tree-shaken.\n\
        ✓ Built build/app/outputs/bundle/release/app-release.aab (21.3MB)\n";

    #[test]
    fn android_bundle_path_is_anchored_to_app_root() {
        let runner = ScriptedRunner::new(vec![Ok(ok_output(GRADLE_OUTPUT))]);
        let mut request = BuildRequest::new(Platform::Android, "/work/shop/app");
        request.flavor = Some("prod".to_string());

        let artifact = build(&runner, &request).expect("build");

        assert_eq!(
            artifact,
            PathBuf::from("/work/shop/app/build/app/outputs/bundle/release/app-release.aab")
        );
        assert_eq!(
            runner.command_lines(),
            vec!["flutter build appbundle --flavor prod"]
        );
        assert_eq!(runner.requests()[0].workdir, PathBuf::from("/work/shop/app"));
    }

    #[test]
    fn android_failure_exit_skips_extraction() {
        let runner = ScriptedRunner::new(vec![Ok(failed_output(1, GRADLE_OUTPUT))]);
        let request = BuildRequest::new(Platform::Android, "/work/shop");

        let err = build(&runner, &request).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Exit { .. })
        ));
    }

    #[test]
    fn android_without_artifact_is_extraction_failure() {
        let runner = ScriptedRunner::new(vec![Ok(ok_output("BUILD SUCCESSFUL\n"))]);
        let request = BuildRequest::new(Platform::Android, "/work/shop");

        let err = build(&runner, &request).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Extraction {
                kind: ArtifactKind::PackageBundle
            })
        ));
    }

    #[test]
    fn ios_chain_runs_pods_settings_archive_and_export() {
        let temp = tempfile::tempdir().expect("tempdir");
        let app = temp.path().join("app");
        fs::create_dir_all(app.join("ios")).expect("mkdir");
        fs::write(app.join("ios/Podfile"), "platform :ios, '13.0'\n").expect("write");
        let archive = app.join("build/ios/archive/Runner.xcarchive");

        let runner = ScriptedRunner::new(vec![
            Ok(ok_output("Pod installation complete!\n")),
            Ok(ok_output(
                "Build settings for action build and target Runner:\n    PRODUCT_BUNDLE_IDENTIFIER = com.acme.shop\n",
            )),
            Ok(ok_output(&format!(
                "Built {}.\nTo upload, open {}\n",
                archive.display(),
                archive.display()
            ))),
            Ok(ok_output(&format!(
                "[12:00:01]: Successfully exported and signed the ipa file:\n[12:00:01]: {}/shop.ipa\n",
                app.join("build/ios/archive").display()
            ))),
        ]);
        let mut request = BuildRequest::new(Platform::Ios, &app);
        request.provisioning_profile = Some("Shop AppStore".to_string());

        let ipa = build(&runner, &request).expect("build");

        assert_eq!(ipa, app.join("build/ios/archive/shop.ipa"));
        let requests = runner.requests();
        assert_eq!(requests[0].to_string(), "pod install --repo-update");
        assert_eq!(requests[0].workdir, app.join("ios"));
        assert_eq!(
            requests[1].to_string(),
            "xcodebuild -showBuildSettings -workspace ios/Runner.xcworkspace -scheme Runner"
        );
        assert_eq!(requests[2].to_string(), "flutter build ipa");
        let export = &requests[3].args;
        assert_eq!(export[0], "export");
        assert!(export.contains(&format!("archive_path:{}", archive.display())));
        assert!(export.contains(&format!(
            "output_directory:{}",
            app.join("build/ios/archive").display()
        )));
        assert!(export.contains(&"bundle_id:com.acme.shop".to_string()));
        assert!(export.contains(&"provisioning_profile:Shop AppStore".to_string()));
    }

    #[test]
    fn relative_ipa_is_anchored_to_fastlane_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let app = temp.path().join("app");
        let fastlane = temp.path().join("release");
        let runner = ScriptedRunner::new(vec![
            Ok(ok_output("    PRODUCT_BUNDLE_IDENTIFIER = com.acme.shop\n")),
            Ok(ok_output("To upload, open build/ios/archive/Runner.xcarchive\n")),
            Ok(ok_output("[12:00:01]: output/shop.ipa\n")),
        ]);
        let mut request = BuildRequest::new(Platform::Ios, &app);
        request.fastlane_dir = Some(fastlane.clone());

        let ipa = build(&runner, &request).expect("build");

        assert_eq!(ipa, fastlane.join("output/shop.ipa"));
        let requests = runner.requests();
        assert_eq!(requests[2].workdir, fastlane);
        assert!(requests[2].args.contains(&format!(
            "archive_path:{}",
            app.join("build/ios/archive/Runner.xcarchive").display()
        )));
    }

    #[test]
    fn ios_without_podfile_skips_pod_install() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ScriptedRunner::new(vec![Ok(ok_output("no identifier here\n"))]);
        let request = BuildRequest::new(Platform::Ios, temp.path());

        let err = build(&runner, &request).unwrap_err();

        assert_eq!(runner.requests()[0].program, "xcodebuild");
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Extraction {
                kind: ArtifactKind::Identifier
            })
        ));
    }
}
