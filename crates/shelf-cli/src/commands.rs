use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use shelf_backend::{BackendConfig, BackendError, StorageBackend};
use shelf_serialization::document;
use shelf_types::Identifier;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = backend_config(&cli.store)?;
    if cli.verbose {
        eprintln!("{} {:?}", "store:".dimmed(), config.kind);
    }
    let backend = config.open().context("failed to open store")?;
    debug!(kind = ?config.kind, cached = config.cached, "opened store");
    let backend = backend.as_ref();

    match cli.command {
        Command::Put(args) => {
            let data = read_input(args.file.as_deref())?;
            cmd_put(backend, &args.id, &data, args.overwrite)
        }
        Command::Get(args) => {
            println!("{}", cmd_get(backend, &args.id)?);
            Ok(())
        }
        Command::Exists(args) => cmd_exists(backend, &args.id, &cli.format),
        Command::Delete(args) => cmd_delete(backend, &args.id),
        Command::Refs(args) => cmd_refs(backend, &args.id, &cli.format),
        Command::Check(args) => cmd_check(backend, &args.id, &cli.format),
    }
}

/// Resolve the store flags into a backend configuration.
pub fn backend_config(store: &StoreArgs) -> anyhow::Result<BackendConfig> {
    if let Some(path) = &store.config {
        return BackendConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    if let Some(path) = &store.archive {
        return Ok(BackendConfig::archive(path));
    }
    let root = store.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    Ok(BackendConfig::filesystem(root))
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut data = String::new();
            std::io::stdin()
                .read_to_string(&mut data)
                .context("failed to read stdin")?;
            Ok(data)
        }
    }
}

fn parse_id(id: &str) -> anyhow::Result<Identifier> {
    Identifier::new(id).with_context(|| format!("invalid identifier {id:?}"))
}

fn cmd_put(backend: &dyn StorageBackend, id: &str, data: &str, overwrite: bool) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    serde_json::from_str::<serde_json::Value>(data).context("document is not valid JSON")?;
    match backend.put(id.as_str(), data, overwrite) {
        Ok(()) => {}
        Err(BackendError::AlreadyExists(_)) => {
            bail!("document {id} already exists (use --overwrite to replace it)")
        }
        Err(e) => return Err(e.into()),
    }
    println!("{} Stored {}", "✓".green().bold(), id.as_str().yellow());
    Ok(())
}

fn cmd_get(backend: &dyn StorageBackend, id: &str) -> anyhow::Result<String> {
    let id = parse_id(id)?;
    match backend.get(id.as_str()) {
        Ok(data) => Ok(data),
        Err(BackendError::NotFound(_)) => bail!("no document {id}"),
        Err(e) => Err(e.into()),
    }
}

fn cmd_exists(backend: &dyn StorageBackend, id: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let present = backend.exists(id.as_str())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "id": id, "exists": present })),
        OutputFormat::Text if present => println!("{} {}", id.as_str().yellow(), "present".green()),
        OutputFormat::Text => println!("{} {}", id.as_str().yellow(), "absent".dimmed()),
    }
    Ok(())
}

fn cmd_delete(backend: &dyn StorageBackend, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    match backend.delete(id.as_str()) {
        Ok(()) => {}
        Err(BackendError::NotFound(_)) => bail!("no document {id}"),
        Err(e) => return Err(e.into()),
    }
    println!("{} Deleted {}", "✓".green().bold(), id.as_str().yellow());
    Ok(())
}

fn cmd_refs(backend: &dyn StorageBackend, id: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let text = cmd_get(backend, id)?;
    let refs = document::references(&text).with_context(|| format!("failed to parse {id}"))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&refs)?),
        OutputFormat::Text if refs.is_empty() => println!("{} makes no references.", id.yellow()),
        OutputFormat::Text => {
            for target in &refs {
                println!("  {} {}", "→".blue(), target.as_str());
            }
        }
    }
    Ok(())
}

fn cmd_check(backend: &dyn StorageBackend, id: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let root = parse_id(id)?;
    let report = document::reference_closure(backend, &root)
        .with_context(|| format!("failed to check {root}"))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "reachable": report.reachable, "dangling": report.dangling })
        ),
        OutputFormat::Text => {
            println!("Reachable documents: {}", report.reachable.len().to_string().bold());
            for missing in &report.dangling {
                println!("  {} {}", "dangling:".red(), missing.as_str());
            }
        }
    }

    if !report.is_complete() {
        bail!("{} dangling reference(s) from {root}", report.dangling.len());
    }
    if matches!(format, OutputFormat::Text) {
        println!("{} No dangling references.", "✓".green().bold());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_backend::{BackendKind, InMemoryBackend};

    const PULSE: &str = r##"{"#identifier": "p1", "#type": "Pulse", "n": 3}"##;
    const MAIN: &str = r##"{"#type": "Container", "first": {"#type": "reference", "#identifier": "p1"}}"##;

    fn store(dir: Option<&str>, archive: Option<&str>, config: Option<&str>) -> StoreArgs {
        StoreArgs {
            dir: dir.map(PathBuf::from),
            archive: archive.map(PathBuf::from),
            config: config.map(PathBuf::from),
        }
    }

    #[test]
    fn default_store_is_current_directory() {
        let config = backend_config(&store(None, None, None)).unwrap();
        assert_eq!(config, BackendConfig::filesystem("."));
    }

    #[test]
    fn archive_flag_selects_archive() {
        let config = backend_config(&store(None, Some("s.zip"), None)).unwrap();
        assert_eq!(
            config.kind,
            BackendKind::Archive {
                path: PathBuf::from("s.zip")
            }
        );
    }

    #[test]
    fn config_flag_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        std::fs::write(&path, "kind = \"memory\"\n").unwrap();
        let config = backend_config(&store(None, None, path.to_str())).unwrap();
        assert_eq!(config.kind, BackendKind::Memory);
    }

    #[test]
    fn put_get_delete() {
        let backend = InMemoryBackend::new();
        cmd_put(&backend, "p1", PULSE, false).unwrap();
        assert_eq!(cmd_get(&backend, "p1").unwrap(), PULSE);

        let err = cmd_put(&backend, "p1", PULSE, false).unwrap_err();
        assert!(err.to_string().contains("--overwrite"));
        cmd_put(&backend, "p1", "{}", true).unwrap();
        assert_eq!(cmd_get(&backend, "p1").unwrap(), "{}");

        cmd_delete(&backend, "p1").unwrap();
        assert!(cmd_get(&backend, "p1").is_err());
        assert!(cmd_delete(&backend, "p1").is_err());
    }

    #[test]
    fn put_rejects_invalid_input() {
        let backend = InMemoryBackend::new();
        assert!(cmd_put(&backend, "p1", "not json", false).is_err());
        assert!(cmd_put(&backend, "", "{}", false).is_err());
        assert!(backend.is_empty());
    }

    #[test]
    fn check_fails_on_dangling_reference() {
        let backend = InMemoryBackend::new();
        backend.put("main", MAIN, false).unwrap();
        let err = cmd_check(&backend, "main", &OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("1 dangling"));

        backend.put("p1", PULSE, false).unwrap();
        cmd_check(&backend, "main", &OutputFormat::Json).unwrap();
        cmd_refs(&backend, "main", &OutputFormat::Text).unwrap();
    }
}
