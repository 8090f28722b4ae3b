use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use csv_ingest_core::contract::PACKAGE_OBJECT_KEY;
use csv_ingest_core::error::IngestError;
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cloud::Packager;

const LAMBDA_PACKAGE: &str = "csv_ingest_lambda";
const LAMBDA_BINARY: &str = "process_csv";
const BOOTSTRAP: &str = "bootstrap";
const STAGING_DIR: &str = "lambda";

// ── helpers ────────────────────────────────────────────────────────

pub fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn run_cargo(args: &[&str]) -> Result<(), IngestError> {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| IngestError::from_io("failed to execute cargo", error))?;
    if !status.success() {
        return Err(IngestError::Local(format!(
            "cargo {} exited with {status}",
            args.join(" ")
        )));
    }
    Ok(())
}

fn ensure_rust_target_installed(target: &str) -> Result<(), IngestError> {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return Ok(());
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::Local(format!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        )));
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        return Err(IngestError::Local(format!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}`"
        )));
    }
    Ok(())
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

/// Compiles the processing function and archives it for upload.
#[derive(Debug, Clone)]
pub struct LambdaPackager {
    build_dir: PathBuf,
    target: String,
}

impl LambdaPackager {
    pub fn new(build_dir: PathBuf, target: String) -> Self {
        Self { build_dir, target }
    }
}

impl Packager for LambdaPackager {
    fn build_package(&self) -> Result<PathBuf, IngestError> {
        ensure_rust_target_installed(&self.target)?;

        step("Build lambda binary");
        run_cargo(&[
            "build",
            "-p",
            LAMBDA_PACKAGE,
            "--bin",
            LAMBDA_BINARY,
            "--target",
            &self.target,
            "--release",
        ])?;

        let binary = Path::new("target")
            .join(&self.target)
            .join("release")
            .join(binary_name(LAMBDA_BINARY, &self.target));

        step("Package lambda zip artifact");
        let staging = self.build_dir.join(STAGING_DIR);
        stage_bootstrap(&binary, &staging)?;
        let zip_path = self.build_dir.join(PACKAGE_OBJECT_KEY);
        let result = zip_directory(&staging, &zip_path);
        fs::remove_dir_all(&staging).map_err(|error| {
            IngestError::from_io(format!("failed to remove {}", staging.display()), error)
        })?;
        result?;

        Ok(zip_path)
    }
}

/// Copies the compiled binary into a fresh staging directory as `bootstrap`.
pub fn stage_bootstrap(binary_path: &Path, staging_dir: &Path) -> Result<(), IngestError> {
    if !binary_path.exists() {
        return Err(IngestError::NotFound(format!(
            "expected lambda binary at '{}'",
            binary_path.display()
        )));
    }
    if staging_dir.exists() {
        fs::remove_dir_all(staging_dir).map_err(|error| {
            IngestError::from_io(format!("failed to clear {}", staging_dir.display()), error)
        })?;
    }
    fs::create_dir_all(staging_dir).map_err(|error| {
        IngestError::from_io(format!("failed to create {}", staging_dir.display()), error)
    })?;
    fs::copy(binary_path, staging_dir.join(BOOTSTRAP))
        .map_err(|error| IngestError::from_io("failed to stage bootstrap", error))?;
    Ok(())
}

/// Zips every file below `dir` with paths relative to it and returns the
/// number of entries. `bootstrap` is stored executable.
pub fn zip_directory(dir: &Path, zip_path: &Path) -> Result<usize, IngestError> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            IngestError::from_io(format!("failed to create {}", parent.display()), error)
        })?;
    }
    let file = fs::File::create(zip_path)
        .map_err(|error| IngestError::from_io("failed to create lambda zip", error))?;
    let mut zip = ZipWriter::new(file);

    for relative in &files {
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let mode = if name == BOOTSTRAP { 0o755 } else { 0o644 };
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);
        let body = fs::read(dir.join(relative))
            .map_err(|error| IngestError::from_io(format!("failed to read {name}"), error))?;

        zip.start_file(name.as_str(), options)
            .map_err(|error| IngestError::Local(format!("failed to start {name} entry: {error}")))?;
        zip.write_all(&body)
            .map_err(|error| IngestError::from_io(format!("failed to write {name} entry"), error))?;
    }

    zip.finish()
        .map_err(|error| IngestError::Local(format!("failed to finish lambda zip: {error}")))?;
    Ok(files.len())
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IngestError> {
    let entries = fs::read_dir(dir)
        .map_err(|error| IngestError::from_io(format!("failed to list {}", dir.display()), error))?;
    for entry in entries {
        let path = entry
            .map_err(|error| IngestError::from_io("failed to read directory entry", error))?
            .path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Hex SHA-256 of a file's bytes.
pub fn file_fingerprint(path: &Path) -> Result<String, IngestError> {
    let mut file = fs::File::open(path).map_err(|error| {
        IngestError::from_io(format!("failed to open {}", path.display()), error)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|error| IngestError::from_io("failed to read package", error))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_staged_directory_with_executable_bootstrap() {
        let workspace = tempfile::tempdir().unwrap();
        let binary = workspace.path().join("process_csv");
        fs::write(&binary, b"\x7fELF-binary").unwrap();
        let staging = workspace.path().join("build").join("lambda");
        stage_bootstrap(&binary, &staging).unwrap();
        fs::create_dir_all(staging.join("conf")).unwrap();
        fs::write(staging.join("conf").join("settings.json"), b"{}").unwrap();

        let zip_path = workspace.path().join("build").join("lambda.zip");
        let entries = zip_directory(&staging, &zip_path).unwrap();
        assert_eq!(entries, 2);

        let mut archive = zip::ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["bootstrap", "conf/settings.json"]);

        let mut bootstrap = archive.by_name("bootstrap").unwrap();
        let mode = bootstrap.unix_mode().expect("unix mode should be recorded");
        assert_eq!(mode & 0o777, 0o755);
        let mut body = Vec::new();
        bootstrap.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"\x7fELF-binary");
    }

    #[test]
    fn staging_requires_compiled_binary() {
        let workspace = tempfile::tempdir().unwrap();
        let error = stage_bootstrap(
            &workspace.path().join("missing"),
            &workspace.path().join("lambda"),
        )
        .expect_err("missing binary should fail");
        assert!(error.is_not_found());
    }

    #[test]
    fn fingerprint_is_stable_sha256() {
        let workspace = tempfile::tempdir().unwrap();
        let path = workspace.path().join("lambda.zip");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            file_fingerprint(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn windows_targets_get_exe_suffix() {
        assert_eq!(binary_name("process_csv", "x86_64-pc-windows-msvc"), "process_csv.exe");
        assert_eq!(binary_name("process_csv", "aarch64-unknown-linux-gnu"), "process_csv");
    }
}
