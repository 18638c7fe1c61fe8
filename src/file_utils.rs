use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

// @const: Marker inserted before the extension of partial outputs
const PARTIAL_MARKER: &str = "partial";

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: Output path next to the input, `<stem>.<language>.<extension>`
    pub fn generate_output_path<P: AsRef<Path>>(input_file: P, target_language: &str, extension: &str) -> PathBuf {
        Self::output_path_with_suffix(input_file.as_ref(), &[target_language], extension)
    }

    // @generates: Partial output path, `<stem>.<language>.partial.<extension>`
    pub fn generate_partial_output_path<P: AsRef<Path>>(
        input_file: P,
        target_language: &str,
        extension: &str,
    ) -> PathBuf {
        Self::output_path_with_suffix(input_file.as_ref(), &[target_language, PARTIAL_MARKER], extension)
    }

    fn output_path_with_suffix(input_file: &Path, parts: &[&str], extension: &str) -> PathBuf {
        let stem = input_file.file_stem().unwrap_or_default();

        let mut output_filename = stem.to_string_lossy().to_string();
        for part in parts {
            output_filename.push('.');
            output_filename.push_str(part);
        }
        output_filename.push('.');
        output_filename.push_str(extension.trim_start_matches('.'));

        match input_file.parent() {
            Some(parent) => parent.join(output_filename),
            None => PathBuf::from(output_filename),
        }
    }

    /// Find files with a specific extension in a directory, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let wanted = extension.trim_start_matches('.');
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// Whether `path` looks like an output this tool wrote for `target_language`
    pub fn is_translation_output<P: AsRef<Path>>(path: P, target_language: &str) -> bool {
        let stem = path.as_ref().file_stem().unwrap_or_default().to_string_lossy().to_string();
        let language_suffix = format!(".{}", target_language);
        let partial_suffix = format!(".{}.{}", target_language, PARTIAL_MARKER);
        stem.ends_with(&language_suffix) || stem.ends_with(&partial_suffix)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        let path = path.as_ref();
        if !Self::file_exists(path) {
            return Err(anyhow!("File does not exist: {:?}", path));
        }
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content).with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }
}
