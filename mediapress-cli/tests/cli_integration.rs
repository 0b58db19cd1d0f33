// End-to-end runs of the `mediapress` binary on image-only inputs, so no
// external encoder is needed.

use assert_cmd::Command;
use predicates::str::contains;
use std::error::Error;
use std::path::Path;
use tempfile::tempdir;

fn mediapress_cmd() -> Command {
    Command::cargo_bin("mediapress").expect("Failed to find mediapress binary")
}

fn write_png(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let img = image::RgbImage::from_fn(32, 24, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 10) as u8, ((x + y) * 4) as u8])
    });
    img.save(path)?;
    Ok(())
}

#[test]
fn test_non_existent_input() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    mediapress_cmd()
        .arg("surely/this/does/not/exist")
        .arg("--output")
        .arg(output_dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Invalid input path"));

    Ok(())
}

#[test]
fn test_empty_directory_reports_no_files() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("empty");
    std::fs::create_dir(&input)?;

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(root.path().join("out"))
        .assert()
        .success()
        .stdout(contains("No media files found!"));

    Ok(())
}

#[test]
fn test_images_converted_to_webp_mirroring_tree() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;
    write_png(&input.join("trip/b.png"))?;
    let output = root.path().join("out");

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--log-dir")
        .arg(root.path().join("logs"))
        .assert()
        .success()
        .stdout(contains("SUMMARY"));

    assert!(output.join("a.webp").is_file());
    assert!(output.join("trip/b.webp").is_file());
    assert!(input.join("a.png").exists());

    let logs: Vec<_> = std::fs::read_dir(root.path().join("logs"))?.collect();
    assert_eq!(logs.len(), 1);
    Ok(())
}

#[test]
fn test_keep_format_and_delete_source() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;
    let output = root.path().join("out");

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--keep-format")
        .arg("--delete-source")
        .assert()
        .success()
        .stderr(contains("--delete-source"));

    assert!(output.join("a.png").is_file());
    assert!(!output.join("a.webp").exists());
    assert!(!input.join("a.png").exists());
    Ok(())
}

#[test]
fn test_default_output_next_to_input() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("shots");
    write_png(&input.join("a.png"))?;

    mediapress_cmd().arg(&input).assert().success();

    assert!(root.path().join("shots_compressed/a.webp").is_file());
    Ok(())
}

#[test]
fn test_existing_output_skipped_on_rerun() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;
    let output = root.path().join("out");
    std::fs::create_dir_all(&output)?;
    std::fs::write(output.join("a.webp"), b"already here")?;
    let report = root.path().join("report.json");

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success();

    assert_eq!(std::fs::read(output.join("a.webp"))?, b"already here");
    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["completed"], 0);
    assert_eq!(summary["tasks"][0]["outcome"]["status"], "skipped");
    Ok(())
}

#[test]
fn test_report_counts_completed() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;
    write_png(&input.join("b.png"))?;
    let report = root.path().join("reports/run.json");

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(root.path().join("out"))
        .arg("--report")
        .arg(&report)
        .arg("--cpu-workers")
        .arg("2")
        .assert()
        .success();

    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
    assert_eq!(summary["total_tasks"], 2);
    assert_eq!(summary["completed"], 2);
    assert_eq!(summary["cancelled"], false);
    Ok(())
}

#[test]
fn test_invalid_preset_rejected() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(root.path().join("out"))
        .arg("--preset")
        .arg("warp")
        .assert()
        .failure()
        .stderr(contains("Unknown preset"));

    Ok(())
}

#[test]
fn test_output_inside_same_directory_rejected() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("photos");
    write_png(&input.join("a.png"))?;
    let input = input.canonicalize()?;

    mediapress_cmd()
        .arg(&input)
        .arg("--output")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("must differ"));

    Ok(())
}

#[test]
fn test_relative_output_aliasing_input_rejected() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    write_png(&root.path().join("photos/a.png"))?;

    mediapress_cmd()
        .current_dir(root.path())
        .arg("photos")
        .arg("--output")
        .arg("./photos")
        .assert()
        .failure()
        .stderr(contains("must differ"));

    mediapress_cmd()
        .current_dir(root.path())
        .arg("photos")
        .arg("--output")
        .arg("photos/out")
        .assert()
        .failure()
        .stderr(contains("inside the input"));

    assert!(!root.path().join("photos/out").exists());
    assert!(!root.path().join("photos/a.webp").exists());
    Ok(())
}

#[test]
fn test_missing_dependency_warned_once() -> Result<(), Box<dyn Error>> {
    let root = tempdir()?;
    let input = root.path().join("videos");
    std::fs::create_dir_all(&input)?;
    std::fs::write(input.join("clip.mp4"), b"not really a video")?;
    let empty_path = root.path().join("bin");
    std::fs::create_dir(&empty_path)?;

    let output = mediapress_cmd()
        .env("PATH", &empty_path)
        .arg(&input)
        .arg("--output")
        .arg(root.path().join("out"))
        .output()?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("'ffprobe' not found").count(),
        1,
        "stderr was:\n{stderr}"
    );
    Ok(())
}
