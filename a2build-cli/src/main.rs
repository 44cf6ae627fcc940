// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use a2image::image::{
    DiskImage, BLOCK_IMAGE_3_5_BLOCK_COUNT, DOS33_SECTORS_PER_TRACK, DOS33_TRACK_COUNT,
    RW18_SECTORS_PER_TRACK, TRACKS_PER_SIDE,
};
use a2image::script::ScriptEngine;
use anyhow::{anyhow, Result};
use asm65::assembler::{Assembler, AssemblerOptions};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::io::Write;
use std::path::PathBuf;

trait CliCommand {
    /// Runs the command, returning the accumulated error count.
    fn run(&self) -> Result<u32>;
}

#[derive(Parser)]
struct Asm {
    /// Assembly source files, assembled in order.
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Directory searched for PUT files. May be given multiple times.
    #[arg(short = 'I', long = "include-dir")]
    include_dirs: Vec<PathBuf>,

    /// Write the listing here instead of stdout.
    #[arg(long)]
    listing: Option<PathBuf>,
}

impl CliCommand for Asm {
    fn run(&self) -> Result<u32> {
        let mut errors = 0;
        let mut listings = String::new();
        for source in &self.sources {
            let options = AssemblerOptions {
                include_dirs: self.include_dirs.clone(),
            };
            let mut assembler = Assembler::from_file(source, options)
                .map_err(|err| anyhow!("{err}"))?;
            assembler.run();
            errors += assembler.error_count();
            listings.push_str(assembler.listing());
        }
        match &self.listing {
            Some(path) => {
                let mut file = std::fs::File::create(path)?;
                file.write_all(listings.as_bytes())?;
            }
            None => print!("{listings}"),
        }
        Ok(errors)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImageFormat {
    /// 3.5" ProDOS block volume (1600 x 512).
    Hdv,
    /// DOS 3.3 sector-ordered floppy (35 x 16 x 256).
    Dsk,
    /// 18-sector-per-track variant (35 x 18 x 256).
    Nib18,
}

#[derive(Parser)]
struct Image {
    /// Insertion script to execute.
    #[arg(long)]
    script: PathBuf,

    /// Path of the image file to write.
    #[arg(long)]
    output: PathBuf,

    /// Geometry of the output image.
    #[arg(long, value_enum, default_value_t = ImageFormat::Hdv)]
    format: ImageFormat,

    /// Block count for hdv images.
    #[arg(long, default_value_t = BLOCK_IMAGE_3_5_BLOCK_COUNT)]
    blocks: usize,
}

impl CliCommand for Image {
    fn run(&self) -> Result<u32> {
        let mut image = match self.format {
            ImageFormat::Hdv => DiskImage::new_block(self.blocks),
            ImageFormat::Dsk => {
                DiskImage::new_nibble(DOS33_TRACK_COUNT, DOS33_SECTORS_PER_TRACK)
            }
            ImageFormat::Nib18 => {
                DiskImage::new_nibble(TRACKS_PER_SIDE, RW18_SECTORS_PER_TRACK)
            }
        };
        let mut engine = ScriptEngine::new(&mut image);
        engine
            .process_script_file(&self.script)
            .map_err(|err| anyhow!("{err}"))?;
        let errors = engine.error_count();
        image.write_image(&self.output).map_err(|err| anyhow!("{err}"))?;
        Ok(errors)
    }
}

#[derive(Subcommand)]
enum Subcommands {
    /// Assemble 6502/65C02 sources into SAV object files.
    Asm(Asm),
    /// Build a disk image from an insertion script.
    Image(Image),
}

impl Subcommands {
    fn as_cli_command(&self) -> &dyn CliCommand {
        match self {
            Self::Asm(c) => c,
            Self::Image(c) => c,
        }
    }
}

#[derive(Parser)]
struct Cli {
    /// Increase logging verbosity. Can be specified multiple times
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Subcommands,
}

impl Cli {
    fn run() -> Result<u32> {
        let cli = Self::parse();

        let log_level = match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(log_level.as_str()),
        );
        builder.init();

        cli.command.as_cli_command().run()
    }
}

fn main() {
    let exit_code = match Cli::run() {
        Ok(0) => 0,
        Ok(errors) => {
            eprintln!("{errors} error(s)");
            1
        }
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    };

    std::process::exit(exit_code)
}
