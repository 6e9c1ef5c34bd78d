//! CSV export of lunch voucher lines
//!
//! Renders a management record as semicolon-separated text, stages it in a
//! temporary file and hands it to a [`FileStorage`].

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tempfile::NamedTempFile;

use crate::i18n::Translator;
use crate::models::{StoredFile, VoucherMgt};

/// Message keys of the export columns, in column order
pub const HEADER_KEYS: [&str; 4] = [
    "Company code",
    "Lunch Voucher's number",
    "Employee",
    "Lunch Voucher format",
];

const FILE_NAME_KEY: &str = "Lunch Voucher Mgt";
const SEPARATOR: &str = ";";

/// Quote a field, doubling embedded quotes. An absent value is an empty,
/// unquoted field.
pub fn escape_csv(value: Option<&str>) -> String {
    match value {
        None => String::new(),
        Some(v) => format!("\"{}\"", v.replace('"', "\"\"")),
    }
}

/// Render the header and one row per line. Rows are joined with `\n`, with
/// no trailing newline.
pub fn render_csv(mgt: &VoucherMgt, translator: &dyn Translator) -> String {
    let header: Vec<String> = HEADER_KEYS
        .iter()
        .map(|key| escape_csv(Some(translator.get(key).as_str())))
        .collect();

    let mut out = header.join(SEPARATOR);

    let company_code = mgt.company.as_ref().and_then(|c| c.code.as_deref());
    for line in &mgt.lines {
        let row = [
            escape_csv(company_code),
            escape_csv(Some(line.voucher_number.to_string().as_str())),
            escape_csv(line.employee.name.as_deref()),
            escape_csv(
                line.employee
                    .lunch_voucher_format
                    .map(|f| f.code().to_string())
                    .as_deref(),
            ),
        ];
        out.push('\n');
        out.push_str(&row.join(SEPARATOR));
    }
    out
}

/// `"<Lunch Voucher Mgt> - YYYY-MM-DD.csv"`
pub fn export_file_name(translator: &dyn Translator, date: NaiveDate) -> String {
    format!("{} - {}.csv", translator.get(FILE_NAME_KEY), date.format("%Y-%m-%d"))
}

/// Write the CSV to a temporary file, removed when the handle is dropped.
pub fn stage_csv(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("lunch-voucher-")
        .suffix(".csv")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Durable storage for exported files
#[allow(async_fn_in_trait)]
pub trait FileStorage: Send + Sync {
    /// Copy `source` into storage under `file_name`
    async fn upload(&self, source: &Path, file_name: &str) -> Result<StoredFile>;

    /// Delete a previously uploaded file
    async fn remove(&self, file: &StoredFile) -> Result<()>;
}

/// Stores files in a local directory, suffixing names that already exist.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn free_path(&self, file_name: &str) -> Result<PathBuf> {
        let candidate = self.root.join(file_name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{}", ext)),
            None => (file_name, String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = self.root.join(format!("{} ({}){}", stem, n, ext));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

impl FileStorage for LocalFileStorage {
    async fn upload(&self, source: &Path, file_name: &str) -> Result<StoredFile> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let target = self.free_path(file_name).await?;
        let size = tokio::fs::copy(source, &target)
            .await
            .with_context(|| format!("Failed to store {}", target.display()))?;

        tracing::info!("Stored export {} ({} bytes)", target.display(), size);
        Ok(StoredFile {
            file_name: file_name.to_string(),
            path: target.display().to_string(),
            size,
        })
    }
    async fn remove(&self, file: &StoredFile) -> Result<()> {
        tokio::fs::remove_file(&file.path)
            .await
            .with_context(|| format!("Failed to remove {}", file.path))?;
        tracing::info!("Removed export {}", file.path);
        Ok(())
    }
}
