//! `mobitool`: thin command-line wrapper over the decoder facade.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use rawml::locale;
use rawml::{Document, LoadOptions, PartRole};

#[derive(Parser)]
#[command(name = "mobitool", disable_version_flag = true)]
#[command(about = "Inspect and unpack Mobipocket/KF8 e-book files")]
struct Args {
    /// Dump decompressed rawml text to FILE.rawml
    #[arg(short = 'd')]
    dump_rawml: bool,

    /// Print record metadata
    #[arg(short = 'm')]
    metadata: bool,

    /// Set decryption PID (requires an external decryptor)
    #[arg(short = 'p', value_name = "PID")]
    pid: Option<String>,

    /// Dump raw records to FILE_records/
    #[arg(short = 'r')]
    raw_records: bool,

    /// Dump reconstructed source parts to FILE_parts/
    #[arg(short = 's')]
    sources: bool,

    /// Print version and exit
    #[arg(short = 'v')]
    version: bool,

    /// Prefer the KF7 half of a hybrid file
    #[arg(short = '7')]
    prefer_kf7: bool,

    /// Input file
    #[arg(required_unless_present = "version")]
    filename: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    if args.version {
        println!("mobitool {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mobitool: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> rawml::Result<()> {
    let path = args.filename.as_deref().expect("filename required by clap");
    let bytes = fs::read(path)?;
    let doc = Document::load_with(
        &bytes,
        LoadOptions {
            prefer_kf7: args.prefer_kf7,
        },
    )?;

    if args.pid.is_some() && doc.record0_header().is_encrypted() {
        return Err(rawml::Error::UnsupportedFormat(
            "document is encrypted; mobitool carries no cipher, install a decryptor".into(),
        ));
    }

    if args.metadata {
        print_metadata(&doc);
    }
    if args.dump_rawml {
        let out = path.with_extension("rawml");
        let text = doc.rawml()?;
        fs::write(&out, text)?;
        println!("rawml dumped to {}", out.display());
    }
    if args.raw_records {
        dump_records(&doc, path)?;
    }
    if args.sources {
        dump_sources(&doc, path)?;
    }
    Ok(())
}

fn print_metadata(doc: &Document) {
    let pdb = &doc.pdb;
    println!("name: {}", pdb.name);
    println!(
        "type/creator: {}/{}",
        String::from_utf8_lossy(&pdb.type_code),
        String::from_utf8_lossy(&pdb.creator)
    );
    println!("records: {}", doc.record_count());
    if let Some(name) = doc.full_name() {
        println!("full name: {name}");
    }

    let record0 = doc.record0_header();
    println!("compression: {}", record0.compression_type);
    println!("encryption: {}", record0.encryption_type);
    println!("text length: {}", record0.text_length);
    println!("text records: {}", record0.text_record_count);

    if let Some(mobi) = doc.mobi_header() {
        if let Some(version) = mobi.version {
            println!("mobi version: {version}");
        }
        if let Some(encoding) = mobi.text_encoding {
            println!("encoding: {encoding}");
        }
        if let Some(tag) = mobi.locale.and_then(locale::locale_string) {
            println!("locale: {tag}");
        }
    }
    if doc.is_hybrid() {
        println!(
            "hybrid file, boundary record: {}",
            doc.kf8_boundary().unwrap_or_default()
        );
    }

    let utf8 = !doc.is_cp1252();
    for record in doc.exth_records() {
        let name = rawml::exth::exth_meta(record.tag)
            .map(|m| m.name)
            .unwrap_or("unknown");
        println!("exth[{}] {}: {}", record.tag, name, record.display_value(utf8));
    }
}

fn dump_records(doc: &Document, path: &Path) -> rawml::Result<()> {
    let dir = path.with_file_name(format!(
        "{}_records",
        path.file_stem().unwrap_or_default().to_string_lossy()
    ));
    fs::create_dir_all(&dir)?;
    for i in 0..doc.record_count() {
        let record = doc.record_by_seq(i).expect("record index in range");
        fs::write(dir.join(format!("record{i:05}.raw")), &record.data)?;
    }
    println!("{} records dumped to {}", doc.record_count(), dir.display());
    Ok(())
}

fn dump_sources(doc: &Document, path: &Path) -> rawml::Result<()> {
    let rawml = doc.parse_rawml()?;
    let dir = path.with_file_name(format!(
        "{}_parts",
        path.file_stem().unwrap_or_default().to_string_lossy()
    ));
    fs::create_dir_all(&dir)?;
    let mut count = 0usize;
    for part in &rawml.markup {
        fs::write(dir.join(part.file_name(PartRole::Markup)), &part.data)?;
        count += 1;
    }
    for part in rawml.flow.iter().skip(1) {
        fs::write(dir.join(part.file_name(PartRole::Flow)), &part.data)?;
        count += 1;
    }
    for part in &rawml.resources {
        fs::write(dir.join(part.file_name(PartRole::Resource)), &part.data)?;
        count += 1;
    }
    println!("{count} parts dumped to {}", dir.display());
    Ok(())
}
