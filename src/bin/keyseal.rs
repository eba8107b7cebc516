//! Keyseal CLI - random-key file encryption
//!
//! Command-line front end for encrypting a file under a freshly generated
//! key and for decrypting it again given the sealed file and its key file.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use keyseal::error::Result;
use keyseal::file_ops::{DecryptOptions, EncryptOptions, Naming};
use keyseal::worker::{self, Job, JobEvent, Outcome};

#[derive(Parser)]
#[command(name = "keyseal")]
#[command(version)]
#[command(about = "Random-key authenticated file encryption.", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Report progress percentages on stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file under a newly generated key
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the sealed message to [default: <stem>_encrypted.<ext>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Path to write the key to [default: <stem>_key.<ext>]
        #[arg(short, long = "key-output", value_name = "FILE")]
        key_output: Option<PathBuf>,

        /// Write the sealed message and key as base64url text
        #[arg(long)]
        armor: bool,

        /// Extension of the derived sealed message path
        #[arg(long, value_name = "EXT", default_value = "enc")]
        encrypted_ext: String,

        /// Extension of the derived key path
        #[arg(long, value_name = "EXT", default_value = "key")]
        key_ext: String,
    },

    /// Decrypt a file with its key file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the sealed message
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the key file produced at encryption time
        #[arg(short, long, value_name = "FILE")]
        key: PathBuf,

        /// Path to write the plaintext to [default: <stem>_decrypted.<ext>]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Reject messages sealed more than this many seconds ago
        #[arg(long, value_name = "SECONDS")]
        max_age: Option<u64>,

        /// Extension of the derived plaintext path (the sealed file does
        /// not record the original one)
        #[arg(long, value_name = "EXT", default_value = "txt")]
        decrypted_ext: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let result = build_job(cli.command).and_then(|job| run(job, cli.progress));

    match result {
        Ok(Outcome::Encrypted(artifacts)) => {
            println!("encrypted: {}", artifacts.sealed.display());
            println!("key: {}", artifacts.key.display());
        }
        Ok(Outcome::Decrypted(output)) => {
            println!("decrypted: {}", output.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            process::exit(1);
        }
    }
}

fn build_job(command: Commands) -> Result<Job> {
    match command {
        Commands::Encrypt {
            input,
            output,
            key_output,
            armor,
            encrypted_ext,
            key_ext,
        } => {
            let naming = Naming {
                encrypted_ext,
                key_ext,
                ..Naming::default()
            };
            let options = EncryptOptions { naming, armor };
            match (output, key_output) {
                (None, None) => Job::encrypt(input, &options),
                (output, key_output) => {
                    let sealed_out = match output {
                        Some(path) => path,
                        None => options.naming.encrypted_path(&input)?,
                    };
                    let key_out = match key_output {
                        Some(path) => path,
                        None => options.naming.key_path(&input)?,
                    };
                    Ok(Job::Encrypt {
                        input,
                        sealed_out,
                        key_out,
                        armor,
                    })
                }
            }
        }
        Commands::Decrypt {
            input,
            key,
            output,
            max_age,
            decrypted_ext,
        } => {
            let options = DecryptOptions {
                naming: Naming {
                    decrypted_ext,
                    ..Naming::default()
                },
                max_age: max_age.map(Duration::from_secs),
            };
            match output {
                None => Job::decrypt(input, key, &options),
                Some(output) => Ok(Job::Decrypt {
                    input,
                    key,
                    output,
                    max_age: options.max_age,
                }),
            }
        }
    }
}

fn run(job: Job, show_progress: bool) -> Result<Outcome> {
    let handle = worker::spawn(job)?;
    if !show_progress {
        return handle.wait();
    }

    let mut stderr = io::stderr();
    for event in handle.events().iter() {
        match event {
            JobEvent::Progress(percent) => {
                let _ = writeln!(stderr, "progress: {}%", percent);
            }
            JobEvent::Finished(outcome) => return Ok(outcome),
            JobEvent::Failed(err) => return Err(err),
        }
    }
    handle.wait()
}
