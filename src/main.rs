use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fatimg::FileDevice;
use fatimg::shell::{Flow, Shell};

mod logger;

/// FAT style file system kept inside a single host file.
#[derive(Debug, Parser)]
#[command(name = "fatimg", version, about)]
struct Args {
    /// Image file, created on the first `format` if it does not exist
    image: PathBuf,

    /// Run the commands of this file and exit
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// More log output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = logger::init(args.verbose) {
        eprintln!("cannot install logger: {}", e);
    }

    let device = Arc::new(FileDevice::new(&args.image));
    let mut shell = match Shell::open(device) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("Cannot load {}: {}", args.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match shell.engine() {
        Some(fs) => {
            let stats = fs.stats();
            println!(
                "Loaded {}: {} bytes, {} clusters of {} bytes, {} free",
                args.image.display(),
                stats.disk_size,
                stats.cluster_count,
                stats.cluster_size,
                stats.free_clusters
            );
            if fs.is_corrupted() {
                println!("Filesystem is corrupted, use 'format' to reformat the image");
            }
        }
        None => println!("You need to format the image, enter format <size><unit>"),
    }

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();

    if let Some(script) = &args.script {
        return match shell.load(script, &mut out, &mut err) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", shell.prompt());
        let _ = out.flush();
        let Some(line) = lines.next() else {
            break;
        };
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        match shell.execute(&line, &mut out, &mut err) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
