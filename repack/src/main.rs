use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::*;
use log::*;
use memmap2::Mmap;
use structopt::*;
use tempfile::NamedTempFile;

use rezip::rewrite::DEFAULT_ROOT;
use rezip::*;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "repack",
    about = "Moves a release .zip under a fixed root and applies the built-in patches"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Change to the given directory before performing any operations.
    #[structopt(short = "C", long)]
    directory: Option<PathBuf>,

    /// The directory to move the archive's contents into
    #[structopt(long, default_value = DEFAULT_ROOT)]
    root: String,

    /// Leave paths alone if the archive has no top-level directory entry,
    /// instead of failing.
    #[structopt(long)]
    allow_missing_root: bool,

    /// Prints the rewritten paths and checks the patches, but writes nothing.
    #[structopt(short = "n", long)]
    dry_run: bool,

    #[structopt(name("input ZIP file"))]
    input: PathBuf,

    #[structopt(name("output ZIP file"), required_unless("dry-run"))]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    if let Some(chto) = &args.directory {
        std::env::set_current_dir(chto)
            .with_context(|| format!("Couldn't set working directory to {}", chto.display()))?;
    }

    info!("Memory mapping {:#?}", &args.input);
    let zip_file = File::open(&args.input).context("Couldn't open zip file")?;
    let mapping = unsafe { Mmap::map(&zip_file).context("Couldn't mmap zip file")? };
    let archive = Archive::parse(&mapping).context("Couldn't load archive")?;

    let table = PatchTable::builtin().context("Built-in patch table is invalid")?;
    let options = RewriteOptions::new()
        .root(args.root.as_str())
        .require_root(!args.allow_missing_root);

    match &args.output {
        Some(output) if !args.dry_run => write_archive(archive, &table, &options, output),
        _ => print_rewrite(archive, &table, &options),
    }
}

fn print_rewrite(archive: Archive, table: &PatchTable, options: &RewriteOptions) -> Result<()> {
    let mut listing = archive.entries.clone();
    root::rewrite_paths(&mut listing, options.root_dir())?;
    for entry in &listing {
        println!("{}", entry.path);
    }
    let directories = listing.iter().filter(|e| e.is_dir()).count();
    println!(
        "{} files in {} directories",
        listing.len() - directories,
        directories
    );

    for spec in &table.specs {
        println!("patch {} after {:?}", spec.target(), spec.anchor());
    }
    let (summary, _) = rewrite(archive, table, options, io::sink())?;
    println!(
        "{} of {} patches apply (table version {})",
        summary.applied, summary.declared, table.version
    );
    Ok(())
}

fn write_archive(
    archive: Archive,
    table: &PatchTable,
    options: &RewriteOptions,
    output: &Path,
) -> Result<()> {
    // Only a successful rewrite reaches the destination path.
    let output_dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(output_dir)
        .with_context(|| format!("Couldn't create a temporary file in {}", output_dir.display()))?;

    let (summary, writer) = rewrite(
        archive,
        table,
        options,
        BufWriter::new(temp.as_file_mut()),
    )
    .context("Couldn't rewrite archive")?;
    drop(writer);

    temp.persist(output)
        .with_context(|| format!("Couldn't write {}", output.display()))?;
    info!(
        "Wrote {} ({} entries, {} patched)",
        output.display(),
        summary.entries,
        summary.patched_entries
    );
    Ok(())
}
