// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use sffs::prelude::*;

#[derive(Parser)]
#[command(name = "sffs-tool", version, about = "SFFS flash image tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and format a fresh flash image
    Create {
        image: PathBuf,
        /// Image capacity in bytes (multiple of the sector size)
        #[arg(short, long, default_value_t = 1024 * 1024)]
        capacity: u32,
        #[arg(short, long, default_value = "sffs")]
        label: String,
    },
    /// Print the sector/page map of an image
    Map { image: PathBuf },
    /// Run the invariant checker over an image
    Check { image: PathBuf },
    /// Copy a local file into the image under a file id
    Put {
        image: PathBuf,
        file_id: u16,
        input: PathBuf,
    },
    /// Copy a file out of the image
    Get {
        image: PathBuf,
        file_id: u16,
        output: PathBuf,
    },
    /// Remove a file from the image
    Remove { image: PathBuf, file_id: u16 },
    /// Print a file's size
    Size { image: PathBuf, file_id: u16 },
    /// Random in-memory workload with full verification
    Stress {
        /// Device capacity in bytes
        #[arg(short, long, default_value_t = 1024 * 1024)]
        capacity: u32,
        #[arg(short, long, default_value_t = 100_000)]
        iters: u32,
        #[arg(short, long, default_value_t = 0x5FF5)]
        seed: u64,
        /// Number of distinct file ids in play
        #[arg(short, long, default_value_t = 50)]
        files: u16,
        #[arg(long, short)]
        quiet: bool,
        #[arg(long, short, action = clap::ArgAction::Count)]
        verbose: u8,
    },
}

fn open_image(path: &PathBuf) -> anyhow::Result<(File, u32)> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    anyhow::ensure!(len > 0 && len <= u32::MAX as u64, "image size out of range");
    Ok((file, len as u32))
}

fn read_all<F: Flash>(fs: &mut SffsFs<F>, file_id: u16) -> anyhow::Result<Vec<u8>> {
    let size = fs.file_size(file_id)? as usize;
    let mut f = fs.open_id(file_id, OpenMode::Read)?;
    let mut out = vec![0u8; size];
    let n = fs.read(&mut f, &mut out)?;
    anyhow::ensure!(n == size, "short read: {n} of {size} bytes");
    Ok(out)
}

fn label_string(fs: &SffsFs<impl Flash>) -> String {
    let bytes = fs.label_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // -q / -v pick the default level; RUST_LOG still overrides per module.
    let level = match &cli.command {
        Commands::Stress { quiet: true, .. } => LevelFilter::Error,
        Commands::Stress { verbose, .. } if *verbose > 0 => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Create {
            image,
            capacity,
            label,
        } => {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&image)?;
            FileFlash::factory_erase(&mut file, capacity)?;
            let mut flash = FileFlash::new(&mut file, capacity);
            sffs::formatter::format(&mut flash, &label)?;
            info!(
                "created {} ({} bytes, label \"{}\")",
                image.display(),
                capacity,
                label
            );
        }

        Commands::Map { image } => {
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            let meta = fs.meta().clone();
            println!(
                "label \"{}\", {} sectors x {} B, {} data pages/sector",
                label_string(&fs),
                meta.sector_count,
                meta.sector_size,
                meta.data_pages_per_sector
            );
            print!("{}", fs.debug_map()?);
        }

        Commands::Check { image } => {
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            let report = Checker::new(&mut fs).check_all()?;
            if report.is_clean() {
                println!("OK: no findings");
            } else {
                for finding in &report.findings {
                    match finding.sector {
                        Some(sector) => {
                            println!("{:?}: sector {}: {}", finding.severity, sector, finding.message)
                        }
                        None => println!("{:?}: {}", finding.severity, finding.message),
                    }
                }
                if report.has_error() {
                    anyhow::bail!("check failed");
                }
            }
        }

        Commands::Put {
            image,
            file_id,
            input,
        } => {
            let data = std::fs::read(&input)?;
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            match fs.file_remove(file_id) {
                Ok(()) | Err(FsError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            let mut f = fs.open_id(file_id, OpenMode::Overwrite)?;
            fs.write(&mut f, &data)?;
            info!("wrote {} bytes to file {}", data.len(), file_id);
        }

        Commands::Get {
            image,
            file_id,
            output,
        } => {
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            let data = read_all(&mut fs, file_id)?;
            std::fs::write(&output, &data)?;
            info!("read {} bytes from file {}", data.len(), file_id);
        }

        Commands::Remove { image, file_id } => {
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            fs.file_remove(file_id)?;
            info!("removed file {}", file_id);
        }

        Commands::Size { image, file_id } => {
            let (mut file, capacity) = open_image(&image)?;
            let flash = FileFlash::new(&mut file, capacity);
            let mut fs = SffsFs::mount(flash)?;
            println!("{}", fs.file_size(file_id)?);
        }

        Commands::Stress {
            capacity,
            iters,
            seed,
            files,
            ..
        } => stress(capacity, iters, seed, files)?,
    }

    Ok(())
}

/// Replaces a file's content wholesale: remove, then write fresh.
fn rewrite<F: Flash>(fs: &mut SffsFs<F>, id: u16, data: &[u8]) -> anyhow::Result<()> {
    match fs.file_remove(id) {
        Ok(()) | Err(FsError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    let mut f = fs.open_id(id, OpenMode::Overwrite)?;
    fs.write(&mut f, data)?;
    Ok(())
}

/// Random rewrite/delete/verify workload against an in-memory device, with
/// every operation checked against an in-RAM model.
fn stress(capacity: u32, iters: u32, seed: u64, files: u16) -> anyhow::Result<()> {
    anyhow::ensure!(files >= 1, "need at least one file");
    let t0 = Instant::now();
    info!("stress: {iters} iterations over {files} files, seed {seed:#x}");

    let mut image = vec![0xFFu8; capacity as usize];
    let mut flash = MemFlash::new(&mut image);
    sffs::formatter::format(&mut flash, "stress")?;
    let mut fs = SffsFs::mount(flash)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: HashMap<u16, Vec<u8>> = HashMap::new();

    for id in 1..=files {
        let mut data = vec![0u8; rng.gen_range(500..=1500)];
        rng.fill_bytes(&mut data);
        rewrite(&mut fs, id, &data)?;
        model.insert(id, data);
    }

    let pb = ProgressBar::new(iters as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.white}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#--"),
    );

    let mut verified = 0u64;
    for iter in 0..iters {
        let id = rng.gen_range(1..=files);
        match rng.gen_range(0..10) {
            0 => {
                let mut data = vec![0u8; rng.gen_range(500..=1500)];
                rng.fill_bytes(&mut data);
                rewrite(&mut fs, id, &data)?;
                model.insert(id, data);
            }
            1 => match model.remove(&id) {
                Some(_) => fs.file_remove(id)?,
                None => anyhow::ensure!(
                    fs.file_remove(id) == Err(FsError::NotFound),
                    "iter {iter}: ghost file {id}"
                ),
            },
            2 => match model.get(&id) {
                Some(data) => anyhow::ensure!(
                    fs.file_size(id)? as usize == data.len(),
                    "iter {iter}: size mismatch on file {id}"
                ),
                None => anyhow::ensure!(
                    fs.file_size(id) == Err(FsError::NotFound),
                    "iter {iter}: ghost size on file {id}"
                ),
            },
            _ => {
                match model.get(&id) {
                    Some(data) => {
                        let got = read_all(&mut fs, id)?;
                        anyhow::ensure!(
                            &got == data,
                            "iter {iter}: content mismatch on file {id}"
                        );
                        verified += 1;
                    }
                    None => anyhow::ensure!(
                        matches!(fs.open_id(id, OpenMode::Read), Err(FsError::NotFound)),
                        "iter {iter}: ghost open on file {id}"
                    ),
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let report = Checker::new(&mut fs).check_all()?;
    anyhow::ensure!(!report.has_error(), "checker findings: {:?}", report.findings);

    info!(
        "stress passed: {iters} iterations, {verified} content verifications, {} files live, {:.2}s",
        model.len(),
        t0.elapsed().as_secs_f32()
    );
    Ok(())
}
