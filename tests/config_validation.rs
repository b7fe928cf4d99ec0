mod common;

use std::path::PathBuf;
use std::time::Duration;

use binwatch::cli::CliArgs;
use binwatch::config::{
    apply_cli_overrides, load_and_validate, load_from_path, load_with_overrides, ConfigFile,
    RawConfigFile,
};
use binwatch::errors::BinwatchError;
use binwatch::process::CommandTemplate;
use binwatch::types::LivenessSpec;
use tempfile::tempdir;

use common::{write_artifact, ConfigFileBuilder, TestResult};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn config_error(raw: RawConfigFile) -> String {
    match ConfigFile::try_from(raw) {
        Err(BinwatchError::ConfigError(msg)) => msg,
        Err(other) => panic!("expected a config error, got {other}"),
        Ok(_) => panic!("expected validation to fail"),
    }
}

#[test]
fn demo_configs_parse() -> TestResult {
    let supervised = load_from_path(demo("supervised.toml"))?;
    assert_eq!(supervised.watch.debounce_window_ms, 500);
    let process = supervised.process.ok_or("missing [process]")?;
    assert_eq!(process.name.as_deref(), Some("model-server"));
    assert_eq!(process.liveness, "stdout:^listening on".parse::<LivenessSpec>()?);

    let embedded = load_from_path(demo("embedded.toml"))?;
    assert!(embedded.watch.watch_enabled);
    assert_eq!(embedded.watch.poll_interval_s, 0);
    assert!(embedded.reload.recheck_after_reload);
    assert!(embedded.process.is_none());
    Ok(())
}

#[test]
fn defaults_fill_missing_keys() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");
    let config_path = write_artifact(
        dir.path(),
        "binwatch.toml",
        format!(
            "[watch]\ntarget_directory = {:?}\ntarget_filename = \"model.bin\"\n\n[process]\nname = \"server\"\ncommand = \"serve --model {{dir}}/{{file}}\"\n",
            dir.path().display().to_string()
        )
        .as_bytes(),
    );

    let cfg = load_and_validate(&config_path)?;
    let detector = cfg.detector_options();
    assert_eq!(detector.debounce, Duration::from_millis(500));
    assert_eq!(detector.poll_interval, Some(Duration::from_secs(3)));
    assert_eq!(cfg.coordinator_options().lease_wait, Duration::from_secs(1));
    assert!(!cfg.coordinator_options().recheck_after_reload);

    let options = cfg.orchestrator_options();
    assert_eq!(options.grace_period, Duration::from_secs(3));
    assert_eq!(options.startup_timeout, Duration::from_secs(30));
    assert_eq!(options.max_start_attempts, 3);

    let spec = cfg.process_spec().ok_or("missing process spec")?;
    assert_eq!(spec.identity, "server");
    assert_eq!(spec.filename, "model.bin");
    assert_eq!(spec.liveness, LivenessSpec::Immediate);
    Ok(())
}

#[test]
fn zero_poll_interval_disables_polling() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");
    let cfg = ConfigFileBuilder::new(dir.path(), "model.bin")
        .poll_interval_s(0)
        .build();
    assert_eq!(cfg.detector_options().poll_interval, None);
    Ok(())
}

#[test]
fn missing_target_is_rejected() -> TestResult {
    let dir = tempdir()?;

    let mut raw = RawConfigFile::default();
    assert!(config_error(raw.clone()).contains("target_directory"));

    raw.watch.target_directory = Some(dir.path().join("nope"));
    raw.watch.target_filename = Some("model.bin".to_string());
    assert!(config_error(raw.clone()).contains("does not exist"));

    raw.watch.target_directory = Some(dir.path().to_path_buf());
    assert!(config_error(raw.clone()).contains("model.bin"));

    raw.watch.target_filename = Some("  ".to_string());
    assert!(config_error(raw.clone()).contains("must not be empty"));

    raw.watch.target_filename = Some("sub/model.bin".to_string());
    assert!(config_error(raw).contains("bare file name"));
    Ok(())
}

#[test]
fn detection_settings_are_checked() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");

    let raw = ConfigFileBuilder::new(dir.path(), "model.bin").debounce_ms(0).raw();
    assert!(config_error(raw).contains("debounce_window_ms"));

    let raw = ConfigFileBuilder::new(dir.path(), "model.bin")
        .poll_interval_s(0)
        .notifications(false)
        .raw();
    assert!(config_error(raw).contains("nothing would detect changes"));
    Ok(())
}

#[test]
fn embedded_watch_excludes_a_managed_process() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");

    let raw = ConfigFileBuilder::new(dir.path(), "model.bin")
        .watch_enabled(true)
        .with_command("server", "serve")
        .raw();
    assert!(config_error(raw).contains("watch_enabled"));
    Ok(())
}

#[test]
fn process_section_is_checked() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");
    let base = ConfigFileBuilder::new(dir.path(), "model.bin")
        .with_command("server", "serve")
        .raw();

    let mut raw = base.clone();
    raw.process.as_mut().ok_or("no process")?.name = Some(" ".to_string());
    assert!(config_error(raw).contains("name is required"));

    let mut raw = base.clone();
    raw.process.as_mut().ok_or("no process")?.image = Some("img".to_string());
    assert!(config_error(raw).contains("not both"));

    let mut raw = base.clone();
    raw.process.as_mut().ok_or("no process")?.command = None;
    assert!(config_error(raw).contains("either `image` or `command`"));

    let mut raw = base.clone();
    {
        let process = raw.process.as_mut().ok_or("no process")?;
        process.command = None;
        process.image = Some("example/server:1".to_string());
        process.runtime = "no-such-container-runtime".to_string();
    }
    assert!(config_error(raw).contains("not found on PATH"));

    let mut raw = base.clone();
    raw.process.as_mut().ok_or("no process")?.max_start_attempts = 0;
    assert!(config_error(raw).contains("max_start_attempts"));

    let mut raw = base;
    raw.process.as_mut().ok_or("no process")?.startup_timeout_s = 0;
    assert!(config_error(raw).contains("startup_timeout_s"));
    Ok(())
}

#[test]
fn liveness_strings_parse() -> TestResult {
    assert_eq!("immediate".parse::<LivenessSpec>()?, LivenessSpec::Immediate);
    assert_eq!(
        "delay:2s".parse::<LivenessSpec>()?,
        LivenessSpec::Delay(Duration::from_secs(2))
    );
    assert!(matches!(
        "stdout:^ready".parse::<LivenessSpec>()?,
        LivenessSpec::StdoutMatch(re) if re.is_match("ready for traffic")
    ));
    assert!("stdout:(".parse::<LivenessSpec>().is_err());
    assert!("sometimes".parse::<LivenessSpec>().is_err());
    Ok(())
}

#[cfg(unix)]
#[test]
fn cli_flags_override_the_file() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");
    let mut raw = ConfigFileBuilder::new(dir.path(), "model.bin")
        .with_command("from-file", "serve")
        .raw();

    let args = CliArgs {
        name: Some("from-cli".to_string()),
        image: Some("example/server:2".to_string()),
        runtime: Some("sh".to_string()),
        debounce_ms: Some(250),
        grace_period: Some(7),
        poll_only: true,
        ..Default::default()
    };
    apply_cli_overrides(&mut raw, &args);

    let cfg = ConfigFile::try_from(raw)?;
    assert!(!cfg.watch.use_notifications);
    assert_eq!(cfg.detector_options().debounce, Duration::from_millis(250));

    let process = cfg.process.ok_or("missing process")?;
    assert_eq!(process.name, "from-cli");
    assert_eq!(process.grace_period, Duration::from_secs(7));
    assert_eq!(
        process.template,
        CommandTemplate::Container {
            runtime: "sh".to_string(),
            image: "example/server:2".to_string(),
        }
    );
    Ok(())
}

#[test]
fn cli_alone_is_enough_to_configure_supervision() -> TestResult {
    let dir = tempdir()?;
    write_artifact(dir.path(), "model.bin", b"v1");

    let args = CliArgs {
        target_dir: Some(dir.path().to_path_buf()),
        target_file: Some("model.bin".to_string()),
        name: Some("server".to_string()),
        command: Some("serve --model {dir}/{file}".to_string()),
        watch_interval: Some(5),
        ..Default::default()
    };
    let cfg = load_with_overrides(&args)?;

    assert_eq!(cfg.target.path(), dir.path().join("model.bin"));
    assert_eq!(
        cfg.detector_options().poll_interval,
        Some(Duration::from_secs(5))
    );
    assert_eq!(
        cfg.process.ok_or("missing process")?.template,
        CommandTemplate::Shell("serve --model {dir}/{file}".to_string())
    );
    Ok(())
}
