use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use leavedesk_core::config::EmployeeDirectoryConfig;
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::DirectoryError;

/// One directory row keyed by column header.
pub type EmployeeRow = BTreeMap<String, String>;

/// Column holding the phone number, searched before any other column.
const PHONE_COLUMN: usize = 1;

/// Free-form HR records, separate from the authoritative user table.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// First row whose phone column, then any column, contains `identifier` case-insensitively.
    async fn lookup(&self, identifier: &str) -> Result<Option<EmployeeRow>, DirectoryError>;

    /// Overwrites known columns of the matched row. Returns `false` when nothing matched.
    async fn update(
        &self,
        identifier: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<bool, DirectoryError>;
}

pub fn directory_from_config(config: &EmployeeDirectoryConfig) -> Arc<dyn EmployeeDirectory> {
    match &config.csv_path {
        Some(path) => Arc::new(CsvEmployeeDirectory::new(path.clone())),
        None => Arc::new(DisabledEmployeeDirectory),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn read(path: &Path) -> Result<Self, DirectoryError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(|header| header.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Writes a sibling file and renames it over `path`, so readers never see a partial table.
    fn write(&self, path: &Path) -> Result<(), DirectoryError> {
        let staging = staging_path(path);
        let mut writer = csv::Writer::from_path(&staging)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    fn find(&self, identifier: &str) -> Option<usize> {
        let needle = identifier.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        let contains = |cell: &String| cell.to_lowercase().contains(&needle);

        self.rows
            .iter()
            .position(|row| row.get(PHONE_COLUMN).is_some_and(contains))
            .or_else(|| self.rows.iter().position(|row| row.iter().any(contains)))
    }

    fn row(&self, index: usize) -> Option<EmployeeRow> {
        let row = self.rows.get(index)?;
        Some(
            self.headers
                .iter()
                .zip(row)
                .filter(|(header, value)| !header.is_empty() && !value.trim().is_empty())
                .map(|(header, value)| (header.clone(), value.clone()))
                .collect(),
        )
    }

    /// Columns are matched case-insensitively; unknown columns are ignored.
    fn apply(&mut self, index: usize, updates: &BTreeMap<String, String>) -> bool {
        let width = self.headers.len();
        let Some(row) = self.rows.get_mut(index) else {
            return false;
        };
        if row.len() < width {
            row.resize(width, String::new());
        }
        for (field, value) in updates {
            if let Some(column) =
                self.headers.iter().position(|header| header.eq_ignore_ascii_case(field.trim()))
            {
                row[column] = value.clone();
            }
        }
        true
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".staging");
    path.with_file_name(name)
}

/// Directory backed by a CSV file whose first row holds the column headers.
pub struct CsvEmployeeDirectory {
    path: PathBuf,
    access: RwLock<()>,
}

impl CsvEmployeeDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), access: RwLock::new(()) }
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, DirectoryError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, DirectoryError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || work(path))
            .await
            .map_err(|join_error| DirectoryError::Io(std::io::Error::other(join_error)))?
    }
}

#[async_trait]
impl EmployeeDirectory for CsvEmployeeDirectory {
    async fn lookup(&self, identifier: &str) -> Result<Option<EmployeeRow>, DirectoryError> {
        let _reading = self.access.read().await;
        let identifier = identifier.to_string();
        self.blocking(move |path| {
            let table = Table::read(&path)?;
            Ok(table.find(&identifier).and_then(|index| table.row(index)))
        })
        .await
    }

    async fn update(
        &self,
        identifier: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<bool, DirectoryError> {
        let _writing = self.access.write().await;
        let identifier = identifier.to_string();
        let changes = updates.clone();
        let updated = self
            .blocking(move |path| {
                let mut table = Table::read(&path)?;
                let Some(index) = table.find(&identifier) else {
                    return Ok(false);
                };
                table.apply(index, &changes);
                table.write(&path)?;
                Ok(true)
            })
            .await?;
        if !updated {
            return Ok(false);
        }
        info!(
            event_name = "directory.row.updated",
            fields = updates.len(),
            "employee directory row updated"
        );
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    table: RwLock<Table>,
}

impl InMemoryEmployeeDirectory {
    pub fn new<H, R>(headers: H, rows: impl IntoIterator<Item = R>) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let table = Table {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().map(|row| row.into_iter().map(Into::into).collect()).collect(),
        };
        Self { table: RwLock::new(table) }
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn lookup(&self, identifier: &str) -> Result<Option<EmployeeRow>, DirectoryError> {
        let table = self.table.read().await;
        Ok(table.find(identifier).and_then(|index| table.row(index)))
    }

    async fn update(
        &self,
        identifier: &str,
        updates: &BTreeMap<String, String>,
    ) -> Result<bool, DirectoryError> {
        let mut table = self.table.write().await;
        match table.find(identifier) {
            Some(index) => Ok(table.apply(index, updates)),
            None => Ok(false),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledEmployeeDirectory;

#[async_trait]
impl EmployeeDirectory for DisabledEmployeeDirectory {
    async fn lookup(&self, _identifier: &str) -> Result<Option<EmployeeRow>, DirectoryError> {
        Err(DirectoryError::NotConfigured)
    }

    async fn update(
        &self,
        _identifier: &str,
        _updates: &BTreeMap<String, String>,
    ) -> Result<bool, DirectoryError> {
        Err(DirectoryError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Write;

    use super::{CsvEmployeeDirectory, EmployeeDirectory, InMemoryEmployeeDirectory};

    const SHEET: &str = "Name,Phone,Department,Position\n\
        Jane Roe,+15550001111,Engineering,Developer\n\
        John Smith,+15550002222,Finance,Accountant\n\
        Finance Lead,+15550003333,Operations,Manager\n";

    fn sheet_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SHEET.as_bytes()).expect("write sheet");
        file
    }

    #[tokio::test]
    async fn phone_column_wins_over_other_columns() {
        let file = sheet_file();
        let directory = CsvEmployeeDirectory::new(file.path());

        let row = directory.lookup("+15550002222").await.expect("lookup").expect("row");
        assert_eq!(row.get("Name").map(String::as_str), Some("John Smith"));

        // "finance" appears in John's department and in the Finance Lead name; neither is a phone.
        let row = directory.lookup("FINANCE").await.expect("lookup").expect("row");
        assert_eq!(row.get("Name").map(String::as_str), Some("John Smith"));

        assert!(directory.lookup("Marketing").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn updates_are_written_back_and_unknown_columns_ignored() {
        let file = sheet_file();
        let directory = CsvEmployeeDirectory::new(file.path());
        let updates = BTreeMap::from([
            ("department".to_string(), "Platform".to_string()),
            ("Shoe Size".to_string(), "44".to_string()),
        ]);

        assert!(directory.update("Jane", &updates).await.expect("update"));
        let written = std::fs::read_to_string(file.path()).expect("read back");
        assert!(written.contains("Jane Roe,+15550001111,Platform,Developer"));
        assert!(!written.contains("Shoe Size"));

        assert!(!directory.update("nobody", &updates).await.expect("update"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lookups_during_updates_always_see_a_whole_file() {
        let file = sheet_file();
        let directory = std::sync::Arc::new(CsvEmployeeDirectory::new(file.path()));

        let mut tasks = tokio::task::JoinSet::new();
        for round in 0..10 {
            let writer = directory.clone();
            tasks.spawn(async move {
                let updates = BTreeMap::from([("Position".to_string(), format!("Level {round}"))]);
                writer.update("Jane", &updates).await.map(|_| ())
            });
            for _ in 0..4 {
                let reader = directory.clone();
                tasks.spawn(async move {
                    let row = reader.lookup("+15550003333").await?;
                    assert_eq!(
                        row.and_then(|row| row.get("Name").cloned()).as_deref(),
                        Some("Finance Lead")
                    );
                    Ok(())
                });
            }
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("task").expect("directory access");
        }

        let staging = super::staging_path(file.path());
        assert!(!staging.exists(), "staging file should be renamed away");
    }

    #[tokio::test]
    async fn in_memory_directory_matches_the_csv_semantics() {
        let directory = InMemoryEmployeeDirectory::new(
            ["Name", "Phone", "Department"],
            [["Priya Patel", "+15550009999", "Legal"]],
        );
        let updates = BTreeMap::from([("Department".to_string(), "Compliance".to_string())]);
        assert!(directory.update("9999", &updates).await.expect("update"));

        let row = directory.lookup("priya").await.expect("lookup").expect("row");
        assert_eq!(row.get("Department").map(String::as_str), Some("Compliance"));
        assert!(directory.lookup("   ").await.expect("lookup").is_none());
    }
}
