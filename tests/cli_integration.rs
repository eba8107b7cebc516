//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get path to the keyseal binary
fn keyseal_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_keyseal"))
}

fn run_keyseal(args: &[&str]) -> Output {
    Command::new(keyseal_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run keyseal")
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_encrypt_decrypt_roundtrip_with_derived_names() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext_path = temp_dir.path().join("hello.txt");
    fs::write(&plaintext_path, "hello, world\n").unwrap();

    let result = run_keyseal(&["encrypt", "-i", path_str(&plaintext_path)]);
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let sealed = temp_dir.path().join("hello_encrypted.enc");
    let key = temp_dir.path().join("hello_key.key");
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains(path_str(&sealed)), "stdout: {}", stdout);
    assert!(stdout.contains(path_str(&key)), "stdout: {}", stdout);

    let result = run_keyseal(&["decrypt", "-i", path_str(&sealed), "-k", path_str(&key)]);
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let decrypted = fs::read_to_string(temp_dir.path().join("hello_decrypted.txt")).unwrap();
    assert_eq!(decrypted, "hello, world\n");
}

#[test]
fn test_explicit_output_paths() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("in.bin");
    let sealed = temp_dir.path().join("sealed.out");
    let key = temp_dir.path().join("secret.out");
    let decrypted = temp_dir.path().join("restored.bin");

    let content: Vec<u8> = (0..=255).collect();
    fs::write(&plaintext, &content).unwrap();

    let result = run_keyseal(&[
        "e",
        "-i",
        path_str(&plaintext),
        "-o",
        path_str(&sealed),
        "-k",
        path_str(&key),
    ]);
    assert!(result.status.success());
    assert_eq!(fs::read(&key).unwrap().len(), 32);

    let result = run_keyseal(&[
        "d",
        "-i",
        path_str(&sealed),
        "-k",
        path_str(&key),
        "-o",
        path_str(&decrypted),
    ]);
    assert!(
        result.status.success(),
        "decrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    assert_eq!(fs::read(&decrypted).unwrap(), content);
}

#[test]
fn test_armored_roundtrip_with_progress() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("notes.md");
    fs::write(&plaintext, "# notes").unwrap();

    let result = run_keyseal(&["--progress", "encrypt", "--armor", "-i", path_str(&plaintext)]);
    assert!(result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("progress: 100%"), "stderr: {}", stderr);

    let sealed = temp_dir.path().join("notes_encrypted.enc");
    let key = temp_dir.path().join("notes_key.key");
    assert!(fs::read_to_string(&sealed).unwrap().starts_with("keyseal1:"));
    assert!(fs::read_to_string(&key).unwrap().starts_with("keyseal-key1:"));

    let result = run_keyseal(&[
        "decrypt",
        "-i",
        path_str(&sealed),
        "-k",
        path_str(&key),
        "--decrypted-ext",
        "md",
    ]);
    assert!(result.status.success());
    let decrypted = fs::read_to_string(temp_dir.path().join("notes_decrypted.md")).unwrap();
    assert_eq!(decrypted, "# notes");
}

#[test]
fn test_decrypt_with_wrong_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("first.txt");
    let second = temp_dir.path().join("second.txt");
    fs::write(&first, "one").unwrap();
    fs::write(&second, "two").unwrap();

    assert!(run_keyseal(&["encrypt", "-i", path_str(&first)]).status.success());
    assert!(run_keyseal(&["encrypt", "-i", path_str(&second)]).status.success());

    let result = run_keyseal(&[
        "decrypt",
        "-i",
        path_str(&temp_dir.path().join("first_encrypted.enc")),
        "-k",
        path_str(&temp_dir.path().join("second_key.key")),
    ]);

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("wrong key"),
        "Expected error message about the key, got: {}",
        stderr
    );
    assert!(!temp_dir.path().join("first_decrypted.txt").exists());
}

#[test]
fn test_decrypt_with_invalid_key_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("doc.txt");
    fs::write(&plaintext, "content").unwrap();
    assert!(run_keyseal(&["encrypt", "-i", path_str(&plaintext)]).status.success());

    let bad_key = temp_dir.path().join("bad.key");
    fs::write(&bad_key, "not a key").unwrap();

    let result = run_keyseal(&[
        "decrypt",
        "-i",
        path_str(&temp_dir.path().join("doc_encrypted.enc")),
        "-k",
        path_str(&bad_key),
    ]);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("invalid key"), "stderr: {}", stderr);
}

#[test]
fn test_encrypt_nonexistent_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.txt");

    let result = run_keyseal(&["encrypt", "-i", path_str(&nonexistent)]);

    assert!(!result.status.success());
    assert!(!temp_dir.path().join("nonexistent_encrypted.enc").exists());
    assert!(!temp_dir.path().join("nonexistent_key.key").exists());
}

#[test]
fn test_empty_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("empty.txt");
    fs::write(&plaintext, b"").unwrap();

    assert!(run_keyseal(&["encrypt", "-i", path_str(&plaintext)]).status.success());

    let result = run_keyseal(&[
        "decrypt",
        "-i",
        path_str(&temp_dir.path().join("empty_encrypted.enc")),
        "-k",
        path_str(&temp_dir.path().join("empty_key.key")),
    ]);
    assert!(result.status.success());
    let content = fs::read(temp_dir.path().join("empty_decrypted.txt")).unwrap();
    assert_eq!(content, b"");
}

#[test]
fn test_large_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("large.bin");
    let large_content = vec![0x42u8; 1024 * 1024];
    fs::write(&plaintext, &large_content).unwrap();

    assert!(run_keyseal(&["encrypt", "-i", path_str(&plaintext)]).status.success());
    let sealed = temp_dir.path().join("large_encrypted.enc");
    assert_eq!(
        fs::metadata(&sealed).unwrap().len(),
        large_content.len() as u64 + 49
    );

    let result = run_keyseal(&[
        "decrypt",
        "-i",
        path_str(&sealed),
        "-k",
        path_str(&temp_dir.path().join("large_key.key")),
        "--max-age",
        "3600",
    ]);
    assert!(result.status.success());
    let decrypted_content = fs::read(temp_dir.path().join("large_decrypted.txt")).unwrap();
    assert_eq!(decrypted_content, large_content);
}

#[test]
fn test_colliding_output_paths_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in.txt");
    let both = temp_dir.path().join("both.out");
    fs::write(&input, "secret").unwrap();

    let result = run_keyseal(&[
        "encrypt",
        "-i",
        path_str(&input),
        "-o",
        path_str(&both),
        "-k",
        path_str(&both),
    ]);

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("same file"), "stderr: {}", stderr);
    assert!(!both.exists());
    assert_eq!(fs::read_to_string(&input).unwrap(), "secret");

    let result = run_keyseal(&[
        "encrypt",
        "-i",
        path_str(&input),
        "-o",
        path_str(&input),
        "-k",
        path_str(&temp_dir.path().join("in.key")),
    ]);
    assert!(!result.status.success());
    assert_eq!(fs::read_to_string(&input).unwrap(), "secret");
}
