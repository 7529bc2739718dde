use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use grove_pack::{PackBuilder, PackFile, PackIndex, StreamingPackWriter};
use grove_store::{LooseObjectStore, ObjectKind, OsStorage, Storage, StorageConfig, SyncMode};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        root,
        fsync,
        format,
    } = cli;
    match command {
        Command::IndexPack(args) => cmd_index_pack(open_storage(&root, fsync)?, args, format),
        Command::HashObject(args) => cmd_hash_object(&root, fsync, args, format),
        Command::ShowIndex(args) => cmd_show_index(args, format),
        Command::BuildPack(args) => cmd_build_pack(args),
    }
}

fn open_storage(root: &Path, fsync: bool) -> anyhow::Result<Arc<dyn Storage>> {
    let config = StorageConfig {
        sync_mode: if fsync {
            SyncMode::EveryCommit
        } else {
            SyncMode::OsDefault
        },
    };
    let storage = OsStorage::with_config(root, config)
        .with_context(|| format!("opening store at {}", root.display()))?;
    Ok(Arc::new(storage))
}

fn cmd_index_pack(
    storage: Arc<dyn Storage>,
    args: IndexPackArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut writer = StreamingPackWriter::new(storage)?;
    let copied = match &args.input {
        Some(path) => {
            let mut file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            io::copy(&mut file, &mut writer)
        }
        None => io::copy(&mut io::stdin().lock(), &mut writer),
    }
    .context("streaming pack")?;
    debug!(bytes = copied, "pack stream received");

    let pack = writer.close().context("indexing pack")?;
    match format {
        OutputFormat::Text => print_pack_text(pack.as_ref()),
        OutputFormat::Json => {
            let value = match &pack {
                Some(p) => json!({
                    "checksum": hex::encode(p.checksum),
                    "objects": p.object_count,
                    "pack": p.pack_path.display().to_string(),
                    "index": p.index_path.display().to_string(),
                }),
                None => json!({ "checksum": null, "objects": 0 }),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn print_pack_text(pack: Option<&PackFile>) {
    match pack {
        Some(p) => {
            println!(
                "{} pack {} ({} objects)",
                "✓".green().bold(),
                hex::encode(p.checksum).yellow(),
                p.object_count
            );
            println!("  {}", p.pack_path.display());
            println!("  {}", p.index_path.display());
        }
        None => println!("{} Empty pack stream, nothing written.", "✓".green()),
    }
}

fn cmd_hash_object(
    root: &Path,
    fsync: bool,
    args: HashObjectArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let kind: ObjectKind = args.kind.parse()?;
    let id = if args.write {
        let storage = open_storage(root, fsync)?;
        let mut file = File::open(&args.path)
            .with_context(|| format!("opening {}", args.path.display()))?;
        let size = file.metadata()?.len();
        let mut writer = LooseObjectStore::new(storage).writer(kind, size)?;
        io::copy(&mut file, &mut writer)?;
        writer.close()?
    } else {
        let data =
            fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;
        kind.hasher().hash(&data)
    };

    match format {
        OutputFormat::Text => println!("{id}"),
        OutputFormat::Json => println!(
            "{}",
            json!({ "id": id.to_hex(), "kind": kind, "written": args.write })
        ),
    }
    Ok(())
}

fn cmd_show_index(args: ShowIndexArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;
    let index = PackIndex::from_bytes(&data)
        .with_context(|| format!("decoding {}", args.path.display()))?;

    match format {
        OutputFormat::Text => {
            println!(
                "Index v{}: {} objects, pack {}",
                index.version,
                index.object_count().to_string().bold(),
                index.checksum_hex().yellow()
            );
            for entry in index.entries() {
                println!(
                    "{}  {:>10}  {:08x}",
                    entry.id.to_hex().cyan(),
                    entry.offset,
                    entry.crc32
                );
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = index
                .entries()
                .iter()
                .map(|e| json!({ "id": e.id.to_hex(), "offset": e.offset, "crc32": e.crc32 }))
                .collect();
            let value = json!({
                "version": index.version,
                "checksum": index.checksum_hex(),
                "entries": entries,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn cmd_build_pack(args: BuildPackArgs) -> anyhow::Result<()> {
    let mut builder = PackBuilder::new();
    for path in &args.paths {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let id = builder.add_object(ObjectKind::Blob, &data);
        debug!(path = %path.display(), id = %id.short_hex(), "added blob");
    }
    let (bytes, index) = builder.finish_to_bytes()?;

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} Wrote {} objects to {} (pack {})",
                "✓".green().bold(),
                index.object_count(),
                path.display(),
                index.checksum_hex().yellow()
            );
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(&bytes)?;
            out.flush()?;
        }
    }
    Ok(())
}
