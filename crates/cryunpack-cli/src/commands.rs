//! Command implementations
//!
//! Each subcommand opens its input, prints a summary to stdout and reports
//! per-item failures without stopping the batch.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use cryunpack::chunkfile::ChunkFileFormat;
use cryunpack::p4k::ExtractOutcome;
use cryunpack::utils::filter_to_glob;
use cryunpack::{
    format_size, ChunkBody, ChunkFile, CompressionMethod, CryXmlFormat, CryXmlReader, DataForge,
    DumpOptions, ExtractOptions, P4kFile, P4kOpenOptions,
};

use crate::OutputFormat;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

fn open_archive(p4k_path: &Path, options: &P4kOpenOptions) -> Result<P4kFile> {
    println!("Opening {}...", p4k_path.display());
    P4kFile::open_with_options(p4k_path, options)
        .with_context(|| format!("Failed to open {}", p4k_path.display()))
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?.progress_chars("#>-"));
    Ok(pb)
}

/// Read a file from disk, or from inside `p4k` when an archive is given
pub fn load_input(path: &Path, p4k: Option<&Path>) -> Result<Vec<u8>> {
    match p4k {
        Some(p4k_path) => {
            let archive = open_archive(p4k_path, &P4kOpenOptions::default())?;
            let name = path.to_string_lossy();
            archive
                .read(&name)
                .with_context(|| format!("Failed to read {} from {}", name, p4k_path.display()))
        }
        None => fs::read(path).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// List files in a P4K archive with optional filtering
pub fn list_files(p4k_path: &Path, filter: Option<&str>) -> Result<()> {
    let p4k = open_archive(p4k_path, &P4kOpenOptions::default())?;
    let pattern = filter_to_glob(filter.unwrap_or("*"));

    let mut count = 0u64;
    let mut total_size = 0u64;
    let mut compressed_size = 0u64;

    for entry in p4k.search(&[pattern], true)? {
        let encrypted = if entry.is_encrypted {
            "Encrypted"
        } else {
            "Plain"
        };

        println!(
            "{:>10} {:>10} {:>8} {:>9} {}",
            format_size(entry.uncompressed_size),
            format_size(entry.compressed_size),
            entry.compression_method.to_string(),
            encrypted,
            entry.name
        );

        count += 1;
        total_size += entry.uncompressed_size;
        compressed_size += entry.compressed_size;
    }

    println!();
    println!(
        "Total: {} files, {} ({} compressed)",
        count,
        format_size(total_size),
        format_size(compressed_size)
    );

    Ok(())
}

/// Show P4K archive information
pub fn show_info(p4k_path: &Path) -> Result<()> {
    let p4k = open_archive(p4k_path, &P4kOpenOptions::default())?;

    let mut total_size = 0u64;
    let mut compressed_size = 0u64;
    let mut store_count = 0u64;
    let mut deflate_count = 0u64;
    let mut zstd_count = 0u64;
    let mut unknown_count = 0u64;
    let mut encrypted_count = 0u64;
    let mut mounted_count = 0u64;

    for entry in p4k.entries() {
        total_size += entry.uncompressed_size;
        compressed_size += entry.compressed_size;

        match entry.compression_method {
            CompressionMethod::Store => store_count += 1,
            CompressionMethod::Deflate => deflate_count += 1,
            CompressionMethod::Zstd => zstd_count += 1,
            CompressionMethod::Unknown(_) => unknown_count += 1,
        }

        if entry.is_encrypted {
            encrypted_count += 1;
        }
        if entry.sub_archive().is_some() {
            mounted_count += 1;
        }
    }

    let ratio = if total_size > 0 {
        (compressed_size as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };

    println!();
    println!("Archive Information:");
    println!("  File: {}", p4k_path.display());
    println!("  Archive size: {}", format_size(p4k.archive_size()));
    println!("  Total files: {}", p4k.len());
    println!("  From sub-archives: {}", mounted_count);
    println!("  Uncompressed size: {}", format_size(total_size));
    println!(
        "  Compressed size: {} ({:.1}%)",
        format_size(compressed_size),
        ratio
    );
    println!();
    println!("Compression Methods:");
    println!("  Store: {} files", store_count);
    println!("  Deflate: {} files", deflate_count);
    println!("  ZSTD: {} files", zstd_count);
    if unknown_count > 0 {
        println!("  Unknown: {} files", unknown_count);
    }
    println!();
    println!("Encryption:");
    println!("  Encrypted: {} files", encrypted_count);
    println!("  Plain: {} files", p4k.len() as u64 - encrypted_count);

    let comment = p4k.comment();
    println!();
    println!("EOCD Comment ({} bytes):", comment.len());
    if comment.is_empty() {
        println!("  (none)");
    } else {
        let hex: Vec<String> = comment.iter().map(|b| format!("{:02X}", b)).collect();
        println!("  Hex: {}", hex.join(" "));
        let ascii: String = comment
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
            .collect();
        println!("  ASCII: {}", ascii);
    }

    Ok(())
}

/// Extract files from a P4K archive with optional filtering and CryXML conversion
pub fn extract_files(
    p4k_path: &Path,
    filter: Option<&str>,
    output: &Path,
    convert: Option<OutputFormat>,
    overwrite: bool,
    mount_sub_archives: bool,
) -> Result<()> {
    let p4k = open_archive(
        p4k_path,
        &P4kOpenOptions {
            mount_sub_archives,
            ..Default::default()
        },
    )?;

    let pattern = filter_to_glob(filter.unwrap_or("*"));
    let entries = p4k.search(&[pattern], true)?;
    if entries.is_empty() {
        println!("No files match the filter");
        return Ok(());
    }

    let options = ExtractOptions {
        overwrite,
        convert_cryxml: convert.map(|format| match format {
            OutputFormat::Xml => CryXmlFormat::Xml,
            OutputFormat::Json => CryXmlFormat::Json,
        }),
    };

    println!("Extracting {} files...", entries.len());
    let pb = progress_bar(entries.len())?;

    let mut extracted = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;

    for entry in entries {
        match p4k.extract_with(entry, output, &options) {
            Ok(ExtractOutcome::Written(_)) => extracted += 1,
            Ok(ExtractOutcome::Skipped(_)) => skipped += 1,
            Err(e) => {
                pb.suspend(|| log::warn!("Failed to extract {}: {}", entry.name, e));
                failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    println!();
    println!("Extracted: {} files", extracted);
    if skipped > 0 {
        println!("Skipped: {} files", skipped);
    }
    if failed > 0 {
        println!("Failed: {} files", failed);
    }

    Ok(())
}

/// Display DCB file information
fn show_dcb_info(df: &DataForge) {
    println!("\nDataForge Info:");
    println!("  Version: {}", df.header.file_version);
    println!("  Legacy format: {}", df.header.is_legacy);
    println!("  Struct definitions: {}", df.header.struct_definition_count);
    println!(
        "  Property definitions: {}",
        df.header.property_definition_count
    );
    println!("  Enum definitions: {}", df.header.enum_definition_count);
    println!("  Data mappings: {}", df.header.data_mapping_count);
    println!("  Records: {}", df.header.record_definition_count);
    println!("  Text length: {} bytes", df.header.text_length);
    println!("  Blob length: {} bytes", df.header.blob_length);
}

/// Relative output path for a record's file name
fn record_output_path(file_name: &str, fallback: &str, extension: &str) -> PathBuf {
    let mut path: PathBuf = Path::new(&file_name.replace('\\', "/"))
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if path.as_os_str().is_empty() {
        path = PathBuf::from(fallback);
    }
    path.set_extension(extension);
    path
}

/// Dump DataForge records to one file each
pub fn convert_dcb(
    data: &[u8],
    source: &Path,
    output: Option<&Path>,
    filter: Option<&str>,
    format: OutputFormat,
    options: &DumpOptions,
    info_only: bool,
) -> Result<()> {
    let df = DataForge::parse(data).context("Failed to parse DataForge file")?;
    show_dcb_info(&df);

    if info_only {
        println!("\nRecord paths (first 20):");
        for (i, path) in df.record_paths().take(20).enumerate() {
            println!("  {}. {}", i + 1, path);
        }
        if df.record_count() > 20 {
            println!("  ... and {} more", df.record_count() - 20);
        }
        return Ok(());
    }

    let records = match filter {
        Some(filter) => df.search_filename(&[filter_to_glob(filter)])?,
        None => df.records().iter().collect(),
    };

    let output_dir = output.map(PathBuf::from).unwrap_or_else(|| {
        let stem = source.file_stem().unwrap_or_default();
        PathBuf::from(stem)
    });
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let extension = match format {
        OutputFormat::Json => "json",
        OutputFormat::Xml => "xml",
    };

    println!(
        "\nExporting {} records to {}...",
        records.len(),
        output_dir.display()
    );
    let pb = progress_bar(records.len())?;

    let mut success = 0u64;
    let mut failed = 0u64;

    for record in records {
        let dumped = match format {
            OutputFormat::Json => df.dump_record_json(record, options),
            OutputFormat::Xml => df.dump_record_xml(record, options),
        };
        let target = output_dir.join(record_output_path(&record.file_name, &record.name, extension));

        let written = dumped.map_err(anyhow::Error::from).and_then(|text| {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, text)?;
            Ok(())
        });
        match written {
            Ok(()) => success += 1,
            Err(e) => {
                pb.suspend(|| log::warn!("Failed to convert record {}: {}", record.name, e));
                failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    println!("\nSaved {} records to {}", success, output_dir.display());
    if failed > 0 {
        println!("Failed: {} records", failed);
    }

    Ok(())
}

fn body_kind(body: &ChunkBody) -> &'static str {
    match body {
        ChunkBody::Raw => "raw",
        ChunkBody::CryXml(_) => "cryxml",
        ChunkBody::Json(_) => "json",
        ChunkBody::MtlName(_) => "mtl name",
        ChunkBody::BoneNameList(_) => "bone names",
        ChunkBody::SourceInfo(_) => "source info",
        ChunkBody::AreaShape(_) => "area shape",
        ChunkBody::IncludedObjects(_) => "included objects",
        ChunkBody::MaterialName(_) => "material name",
    }
}

/// Print the chunk table of a chunk file
pub fn show_chunks(data: &[u8], source: &Path, json: bool) -> Result<()> {
    let file = ChunkFile::open(data)
        .with_context(|| format!("Failed to parse chunk file {}", source.display()))?;

    if json {
        println!("{}", file.to_json()?);
        return Ok(());
    }

    let format = match file.header.format {
        ChunkFileFormat::ChCr => "CrCh",
        ChunkFileFormat::Ivo => "#ivo",
    };
    let version = match file.header.version.name() {
        Some(name) => name.to_string(),
        None => format!("{:#x}", file.header.version.raw()),
    };

    println!("Chunk file: {}", source.display());
    println!("  Format: {} ({})", format, version);
    println!("  Chunks: {}", file.header.num_chunks);
    println!();

    for chunk in &file.chunks {
        let header = &chunk.header;
        let id = header.id.map(|id| id.to_string()).unwrap_or_default();
        let type_name = header
            .type_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:#x}", header.raw_type()));
        println!(
            "{:>6} {:<28} {:>6x} {:>10x} {:>10} {}",
            id,
            type_name,
            header.version,
            header.offset,
            format_size(header.size),
            body_kind(&chunk.body)
        );
    }

    if !file.failures.is_empty() {
        println!();
        println!("Failed chunks:");
        for failure in &file.failures {
            println!(
                "  {:#x} at {:#x}: {}",
                failure.header.raw_type(),
                failure.header.offset,
                failure.error
            );
        }
    }

    Ok(())
}

/// Convert a CryXML document to XML text or JSON
pub fn convert_cryxml(data: &[u8], format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let text = match format {
        OutputFormat::Xml => CryXmlReader::parse(data).context("Failed to convert CryXML")?,
        OutputFormat::Json => {
            let element = CryXmlReader::parse_element(data).context("Failed to parse CryXML")?;
            serde_json::to_string_pretty(&element.to_dict())?
        }
    };

    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", text),
    }
    Ok(())
}
