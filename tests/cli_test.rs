mod common;
mod utils;

use anyhow::Result;
use common::TestEnvironment;
use utils::run_wallset_command;

#[tokio::test]
async fn bootstrap_on_a_fresh_install_returns_defaults() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = run_wallset_command(&env, &["bootstrap"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);

    let state = output.json()?;
    assert_eq!(state["history"], serde_json::json!([]));
    assert_eq!(state["goalsDraft"]["title"], "");
    assert_eq!(state["goalsDraft"]["theme"], "#1f1f1f");
    assert!(state["lastAppliedPath"].is_null());

    assert!(env.config_dir().join("wallset.toml").exists());
    Ok(())
}

#[tokio::test]
async fn saved_draft_is_normalized_and_survives_restart() -> Result<()> {
    let env = TestEnvironment::new()?;

    let draft = r##"{"title":"Q4","goalsText":"Ship\nRest","theme":"#ABC"}"##;
    let output = run_wallset_command(&env, &["save-draft", draft])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    assert_eq!(output.json()?["success"], true);
    assert!(env.state_file().exists());

    let state = run_wallset_command(&env, &["bootstrap"])?.json()?;
    assert_eq!(state["goalsDraft"]["title"], "Q4");
    assert_eq!(state["goalsDraft"]["goalsText"], "Ship\nRest");
    assert_eq!(state["goalsDraft"]["theme"], "#aabbcc");
    Ok(())
}

#[tokio::test]
async fn applying_a_missing_file_reports_file_not_found() -> Result<()> {
    let env = TestEnvironment::new()?;
    let missing = env.path().join("missing.png");

    let output = run_wallset_command(&env, &["apply", missing.to_str().unwrap()])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stdout.trim().is_empty());

    let error = output.error_json()?;
    assert_eq!(error["error"], true);
    assert_eq!(error["code"], "file_not_found");
    assert!(!error["suggestion"].as_str().unwrap_or_default().is_empty());

    let state = run_wallset_command(&env, &["bootstrap"])?.json()?;
    assert_eq!(state["history"], serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn applying_an_unsupported_extension_is_rejected() -> Result<()> {
    let env = TestEnvironment::new()?;
    let vector = env.path().join("logo.svg");
    std::fs::write(&vector, "<svg/>")?;

    let output = run_wallset_command(&env, &["apply", vector.to_str().unwrap()])?;
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "unsupported_format");
    Ok(())
}

#[cfg(not(target_os = "macos"))]
#[tokio::test]
async fn applying_without_osascript_fails_cleanly() -> Result<()> {
    let env = TestEnvironment::new()?;
    let image = env.write_png("photo.png", 16, 9)?;

    let output = run_wallset_command(&env, &["apply", image.to_str().unwrap()])?;
    assert_eq!(output.exit_code, 1);

    let error = output.error_json()?;
    assert_eq!(error["code"], "apply_failed");
    assert!(error["message"].as_str().unwrap_or_default().contains("osascript"));

    let state = run_wallset_command(&env, &["bootstrap"])?.json()?;
    assert_eq!(state["history"], serde_json::json!([]));
    assert!(state["lastAppliedPath"].is_null());
    Ok(())
}

#[tokio::test]
async fn generating_with_blank_goals_reports_empty_goals() -> Result<()> {
    let env = TestEnvironment::new()?;

    let draft = r#"{"title":"Nothing","goalsText":"  \n\n  "}"#;
    let output = run_wallset_command(&env, &["generate-goals", draft])?;
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "empty_goals");
    Ok(())
}

#[tokio::test]
async fn generating_goals_writes_a_png_at_screen_size() -> Result<()> {
    let env = TestEnvironment::new()?;

    let draft = r##"{"title":"This week","goalsText":"Run\nRead\nRest","theme":"#336699"}"##;
    let output = run_wallset_command(&env, &["generate-goals", draft])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);

    let response = output.json()?;
    assert_eq!(response["success"], true);
    let file = std::path::PathBuf::from(response["fileURL"].as_str().unwrap());
    assert!(file.starts_with(env.data_dir().join("generated")));
    assert_eq!(file.extension().and_then(|e| e.to_str()), Some("png"));

    let (width, height) = image::image_dimensions(&file)?;
    assert_eq!((width, height), (1920, 1080));
    assert_eq!(response["width"], 1920);
    assert_eq!(response["height"], 1080);

    // the draft used for rendering becomes the saved draft
    let state = run_wallset_command(&env, &["bootstrap"])?.json()?;
    assert_eq!(state["goalsDraft"]["theme"], "#336699");
    Ok(())
}

#[tokio::test]
async fn malformed_draft_json_is_an_internal_error() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = run_wallset_command(&env, &["save-draft", "{not json"])?;
    assert_eq!(output.exit_code, 1);
    let error = output.error_json()?;
    assert_eq!(error["code"], "internal");
    assert!(error["message"].as_str().unwrap_or_default().contains("goals draft"));
    Ok(())
}

#[tokio::test]
async fn history_commands_on_an_empty_history() -> Result<()> {
    let env = TestEnvironment::new()?;

    let invalid = run_wallset_command(&env, &["delete-history", "not-a-uuid"])?;
    assert_eq!(invalid.exit_code, 1);
    assert_eq!(invalid.error_json()?["code"], "internal");

    let unknown = run_wallset_command(
        &env,
        &["delete-history", "6f1d3c52-3c1e-4d8e-9a4c-0b6a5f8e2d11"],
    )?;
    assert_eq!(unknown.exit_code, 0, "stderr: {}", unknown.stderr);
    assert_eq!(unknown.json()?["removed"], false);

    let restore_invalid = run_wallset_command(&env, &["restore", "not-a-uuid"])?;
    assert_eq!(restore_invalid.exit_code, 1);
    assert_eq!(restore_invalid.error_json()?["code"], "internal");

    let restore_unknown = run_wallset_command(
        &env,
        &["restore", "6f1d3c52-3c1e-4d8e-9a4c-0b6a5f8e2d11"],
    )?;
    assert_eq!(restore_unknown.exit_code, 1);
    assert_eq!(restore_unknown.error_json()?["code"], "file_not_found");

    let cleared = run_wallset_command(&env, &["clear-history"])?;
    assert_eq!(cleared.exit_code, 0, "stderr: {}", cleared.stderr);
    assert_eq!(cleared.json()?["success"], true);
    Ok(())
}

#[tokio::test]
async fn corrupt_state_is_reported_as_a_persistence_failure() -> Result<()> {
    let env = TestEnvironment::new()?;
    std::fs::write(env.state_file(), r#"{"history": 3"#)?;

    let output = run_wallset_command(&env, &["bootstrap"])?;
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "persistence_failed");
    assert_eq!(std::fs::read_to_string(env.state_file())?, r#"{"history": 3"#);
    Ok(())
}

#[cfg(not(target_os = "macos"))]
#[tokio::test]
async fn screen_info_falls_back_to_the_configured_size() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = run_wallset_command(&env, &["screen-info"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    let size = output.json()?;
    assert_eq!(size["width"], 1920);
    assert_eq!(size["height"], 1080);
    Ok(())
}

#[tokio::test]
async fn crop_apply_validates_the_source_image() -> Result<()> {
    let env = TestEnvironment::new()?;
    let missing = env.path().join("gone.jpg");
    let request = serde_json::json!({
        "path": missing,
        "zoom": 2.0,
        "offsetX": 0.0,
        "offsetY": 0.0,
        "containerWidth": 320.0,
        "containerHeight": 180.0,
    });

    let output = run_wallset_command(&env, &["crop-apply", &request.to_string()])?;
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "file_not_found");
    Ok(())
}

#[tokio::test]
async fn logs_are_empty_without_debug_runs() -> Result<()> {
    let env = TestEnvironment::new()?;

    let output = run_wallset_command(&env, &["logs"])?;
    assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    assert_eq!(output.json()?["logs"], serde_json::json!([]));
    Ok(())
}

#[cfg(not(target_os = "macos"))]
#[tokio::test]
async fn crop_apply_replays_gestures_before_cropping() -> Result<()> {
    let env = TestEnvironment::new()?;
    let image = env.write_png("wide.png", 64, 24)?;
    let request = serde_json::json!({
        "path": image,
        "containerWidth": 320.0,
        "containerHeight": 180.0,
        "gestures": [
            { "magnify": { "factor": 2.0 } },
            { "drag": { "dx": 40.0, "dy": 0.0 } },
            { "scroll": { "delta": 5.0, "precise": true } }
        ],
    });

    let output = run_wallset_command(
        &env,
        &["--debug", "--format", "json", "crop-apply", &request.to_string()],
    )?;
    assert!(
        output.stderr.contains(r#""code":"crop.step""#),
        "stderr: {}",
        output.stderr
    );

    // the crop is written at screen size even though applying needs osascript
    let cropped: Vec<_> = std::fs::read_dir(env.data_dir().join("cropped"))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    assert_eq!(cropped.len(), 1);
    assert_eq!(image::image_dimensions(&cropped[0])?, (1920, 1080));

    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "apply_failed");
    Ok(())
}

#[cfg(not(target_os = "macos"))]
#[tokio::test]
async fn restore_reapplies_the_history_entry() -> Result<()> {
    let env = TestEnvironment::new()?;
    let image = env.write_png("earlier.png", 16, 9)?;
    let state = serde_json::json!({
        "history": [{
            "id": "0b5f7d1e-8a43-4c55-9f6e-2d7a1c3e9b40",
            "fileURL": image,
            "createdAt": "2024-05-01T10:00:00Z",
            "source": "generatedGoals",
            "metadata": { "title": "Spring" }
        }],
    });
    std::fs::write(env.state_file(), state.to_string())?;

    let output = run_wallset_command(
        &env,
        &["--debug", "--format", "json", "restore", "0b5f7d1e-8a43-4c55-9f6e-2d7a1c3e9b40"],
    )?;
    assert!(
        output.stderr.contains(r#""code":"wallpaper.history_restored""#),
        "stderr: {}",
        output.stderr
    );

    // the entry's file reached the apply step, which needs osascript here
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.error_json()?["code"], "apply_failed");

    let after = run_wallset_command(&env, &["bootstrap"])?.json()?;
    assert_eq!(after["history"].as_array().map(Vec::len), Some(1));
    Ok(())
}
