use crate::imports::io_common::SourceFile;
use crate::imports::*;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub role: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

impl FileSource {
    /// The declared mime type, or the one implied by the extension of the file.
    pub fn mime_type(&self) -> String {
        if let Some(m) = &self.mime_type {
            return m.clone();
        }
        let extension = Path::new(&self.file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("xlsx") => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string()
            }
            Some("xls") => "application/vnd.ms-excel".to_string(),
            Some("txt") => "text/plain".to_string(),
            _ => "text/csv".to_string(),
        }
    }
}

/// The description of one import.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub database: String,
    pub registry: String,
    pub election: Election,
    pub format: Format,
    pub files: Vec<FileSource>,
    pub number: Option<String>,
    pub district: Option<String>,
    #[serde(rename = "partyResults")]
    pub party_results: Option<FileSource>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryEntity {
    name: String,
    #[serde(default)]
    district: String,
}

pub fn read_config(path: &str) -> ImportResult<BatchConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: BatchConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// The registry, keyed by year and entity id.
pub fn read_registry(path: &Path) -> ImportResult<EntityRegistry> {
    let path_s = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path: &path_s })?;
    parse_registry(&contents).context(ParsingJsonSnafu { path: path_s })?
}

fn parse_registry(contents: &str) -> serde_json::Result<ImportResult<EntityRegistry>> {
    let raw: BTreeMap<String, BTreeMap<String, RegistryEntity>> = serde_json::from_str(contents)?;
    Ok(registry_from(raw))
}

fn registry_from(
    raw: BTreeMap<String, BTreeMap<String, RegistryEntity>>,
) -> ImportResult<EntityRegistry> {
    let mut registry = EntityRegistry::new();
    for (year_s, entities) in raw {
        let year = year_s
            .trim()
            .parse::<i32>()
            .ok()
            .context(InvalidRegistrySnafu { key: &year_s })?;
        for (id_s, e) in entities {
            let id = id_s
                .trim()
                .parse::<u32>()
                .ok()
                .context(InvalidRegistrySnafu {
                    key: format!("{}/{}", year_s, id_s),
                })?;
            registry.insert(
                year,
                id,
                Entity {
                    name: e.name,
                    district: e.district,
                },
            );
        }
    }
    Ok(registry)
}

pub fn read_source(root: &Path, source: &FileSource) -> ImportResult<SourceFile> {
    let p = root.join(&source.file_path);
    let bytes = fs::read(&p).context(OpeningFileSnafu {
        path: p.display().to_string(),
    })?;
    let name = p
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&source.file_path);
    Ok(SourceFile::new(name, &source.mime_type(), bytes))
}

/// Reads all the files of the batch. The paths are relative to the directory of
/// the configuration.
pub fn read_batch(root: &Path, config: &BatchConfig) -> ImportResult<Batch> {
    let mut batch = Batch::new(config.format);
    for source in config.files.iter() {
        let file = read_source(root, source)?;
        debug!("read_batch: {} -> {} ({} bytes)", source.role, file.name, file.bytes.len());
        batch = batch.with_file(&source.role, file);
    }
    batch.number = config.number.clone();
    batch.district = config.district.clone();
    batch.party_results = match &config.party_results {
        Some(source) => Some(read_source(root, source)?),
        None => None,
    };
    Ok(batch)
}

pub fn read_summary(path: &str) -> ImportResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    info!("read_summary: {:?}", contents.len());
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_batch_config() {
        let js = r#"{
            "database": "results.db",
            "registry": "registry.json",
            "election": {
                "id": "nr-2015",
                "system": "proporz",
                "domain": "canton",
                "year": 2015,
                "numberOfMandates": 3,
                "hasExpats": true
            },
            "format": "wabsti",
            "files": [
                {"role": "results", "filePath": "data/results.xlsx"},
                {"role": "statistics", "filePath": "data/stats.csv", "mimeType": "text/plain"}
            ]
        }"#;
        let config: BatchConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.format, Format::Wabsti);
        assert_eq!(config.election.system, ElectionSystem::Proporz);
        assert!(config.election.has_expats);
        assert_eq!(config.election.status, Status::Unknown);
        assert_eq!(config.number, None);
        assert_eq!(
            config.files[0].mime_type(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(config.files[1].mime_type(), "text/plain");
    }

    #[test]
    fn reads_a_registry() {
        let js = r#"{"2015": {"1701": {"name": "Baar", "district": "Zug"}, "1702": {"name": "Cham"}}}"#;
        let registry = parse_registry(js).unwrap().unwrap();
        assert_eq!(registry.get(2015, 1701).unwrap().name, "Baar");
        assert_eq!(registry.get(2015, 1702).unwrap().district, "");
        assert!(registry.get(2016, 1701).is_none());

        let js = r#"{"2015": {"Baar": {"name": "Baar"}}}"#;
        let err = parse_registry(js).unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Invalid entry 2015/Baar in the entity registry");
    }
}
