//! Process-backed collaborators driven by small shell commands.

use promogate_ci::{
    CheckCatalog, CommandArtifactBuilder, CommandCheckExecutor, CommandPublisher, CommandSpec,
};
use promogate_core::collaborators::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, CheckExecutor, PublishError,
    RegistryCredentials,
};
use promogate_core::domain::{CandidateRef, CheckOutcome};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sh(name: &str, script: &str, timeout_secs: u64) -> CommandSpec {
    CommandSpec::new(
        name,
        vec!["sh".into(), "-c".into(), script.into()],
        timeout_secs,
    )
}

fn candidate() -> CandidateRef {
    CandidateRef::new("abc123")
}

fn creds() -> RegistryCredentials {
    RegistryCredentials::new("ci-bot", "s3cret")
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passing_command_is_a_pass() {
    let exec = CommandCheckExecutor::new(CheckCatalog::empty().with(sh("lint", "exit 0", 5)));
    let result = exec.run("lint", &candidate()).await.expect("check runs");
    assert_eq!(result.outcome, CheckOutcome::Pass);
    assert_eq!(result.name, "lint");
}

#[tokio::test]
async fn failing_command_reports_exit_code_and_stderr() {
    let exec = CommandCheckExecutor::new(
        CheckCatalog::empty().with(sh("unittests", "echo '2 tests failed' >&2; exit 3", 5)),
    );
    let result = exec.run("unittests", &candidate()).await.expect("check runs");
    assert_eq!(result.outcome, CheckOutcome::Fail);
    assert!(result.detail.contains("exit code 3"));
    assert!(result.detail.contains("2 tests failed"));
}

#[tokio::test]
async fn candidate_is_substituted_into_arguments() {
    let exec = CommandCheckExecutor::new(
        CheckCatalog::empty().with(sh("pinned", "test \"$0\" = abc123", 5).with_arg("{candidate}")),
    );
    let result = exec.run("pinned", &candidate()).await.expect("check runs");
    assert_eq!(result.outcome, CheckOutcome::Pass);
}

#[tokio::test]
async fn unknown_check_is_an_error() {
    let exec = CommandCheckExecutor::new(CheckCatalog::empty());
    let err = exec.run("typecheck", &candidate()).await.unwrap_err();
    assert!(err.0.contains("typecheck"));
}

#[tokio::test]
async fn missing_executable_is_an_error() {
    let spec = CommandSpec::new("fmt", vec!["/nonexistent/promogate-fmt".into()], 5);
    let exec = CommandCheckExecutor::new(CheckCatalog::empty().with(spec));
    let err = exec.run("fmt", &candidate()).await.unwrap_err();
    assert!(err.0.contains("failed to spawn"));
}

#[tokio::test]
async fn timed_out_check_is_an_error() {
    let exec = CommandCheckExecutor::new(CheckCatalog::empty().with(sh("slow", "sleep 5", 1)));
    let err = exec.run("slow", &candidate()).await.unwrap_err();
    assert!(err.0.contains("timed out"));
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

#[tokio::test]
async fn build_uses_last_stdout_line() {
    let spec = sh("build", "echo compiling; echo \"image:$0\"; echo", 5).with_arg("{candidate}");
    let artifact = CommandArtifactBuilder::new(spec)
        .build(&candidate())
        .await
        .expect("build succeeds");
    assert_eq!(artifact, ArtifactHandle::new("image:abc123"));
}

#[tokio::test]
async fn build_failure_carries_stderr() {
    let spec = sh("build", "echo 'no Dockerfile' >&2; exit 1", 5);
    let err = CommandArtifactBuilder::new(spec)
        .build(&candidate())
        .await
        .unwrap_err();
    assert!(err.0.contains("no Dockerfile"));
}

#[tokio::test]
async fn silent_build_is_an_error() {
    let err = CommandArtifactBuilder::new(sh("build", "true", 5))
        .build(&candidate())
        .await
        .unwrap_err();
    assert!(err.0.contains("no artifact"));
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_receives_credentials_in_environment() {
    let spec = sh(
        "publish",
        "test \"$PROMOGATE_REGISTRY_USERNAME\" = ci-bot && test \"$PROMOGATE_REGISTRY_PASSWORD\" = s3cret && echo \"registry.local/$0\"",
        5,
    )
    .with_arg("{artifact}");
    let published = CommandPublisher::new(spec)
        .publish(&ArtifactHandle::new("image:abc123"), &creds())
        .await
        .expect("publish succeeds");
    assert_eq!(published.as_str(), "registry.local/image:abc123");
}

#[tokio::test]
async fn silent_publish_falls_back_to_artifact() {
    let published = CommandPublisher::new(sh("publish", "true", 5))
        .publish(&ArtifactHandle::new("image:abc123"), &creds())
        .await
        .expect("publish succeeds");
    assert_eq!(published.as_str(), "image:abc123");
}

#[tokio::test]
async fn tempfail_exit_code_is_transient() {
    let err = CommandPublisher::new(sh("publish", "echo 'rate limited' >&2; exit 75", 5))
        .publish(&ArtifactHandle::new("a"), &creds())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Transient(ref d) if d.contains("rate limited")));
}

#[tokio::test]
async fn other_exit_codes_are_fatal() {
    let err = CommandPublisher::new(sh("publish", "exit 1", 5))
        .publish(&ArtifactHandle::new("a"), &creds())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Fatal(_)));
}

#[tokio::test]
async fn custom_transient_codes_replace_default() {
    let publisher =
        CommandPublisher::new(sh("publish", "exit 75", 5)).with_transient_exit_codes(vec![69]);
    let err = publisher
        .publish(&ArtifactHandle::new("a"), &creds())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Fatal(_)));
}

#[tokio::test]
async fn publish_timeout_is_transient() {
    let err = CommandPublisher::new(sh("publish", "sleep 5", 1))
        .publish(&ArtifactHandle::new("a"), &creds())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Transient(ref d) if d.contains("timed out")));
}
