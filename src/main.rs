#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::{Path, PathBuf};
    use std::process::ExitCode;

    use clap::{Parser, Subcommand};

    use papersite::serve::{self, ServeOptions};
    use papersite::{toc, SiteError};

    /// Explicit subcommands.
    #[derive(Subcommand)]
    enum Commands {
        /// Serve a paper site directory over HTTP for local preview
        Serve {
            /// Site root holding the markdown files and the wasm package
            #[arg(default_value = ".")]
            root: PathBuf,
            /// Site config file (defaults to <root>/site.yml when present)
            #[arg(long)]
            config: Option<PathBuf>,
            /// Document loaded at startup, relative to the root
            #[arg(long)]
            document: Option<String>,
            /// Interface address to bind to
            #[arg(long, default_value = "127.0.0.1")]
            bind: String,
            /// Starting port number for the HTTP server
            #[arg(long, default_value = "3333")]
            port: u16,
        },
        /// Print the table of contents a markdown file produces
        Toc {
            /// Path to the markdown file
            file: PathBuf,
        },
    }

    #[derive(Parser)]
    #[command(
        name = "papersite",
        version,
        about = "Host a single-paper site: markdown, table of contents and citation dialog"
    )]
    struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    fn print_outline(path: &Path) -> Result<(), SiteError> {
        let text = std::fs::read_to_string(path).map_err(|source| SiteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = toc::extract_headings(&text);
        if entries.is_empty() {
            println!("(no level-2 or level-3 headings)");
        } else {
            print!("{}", toc::outline_text(&entries));
        }
        Ok(())
    }

    fn run(cli: Cli) -> Result<(), SiteError> {
        match cli.command {
            Commands::Serve {
                root,
                config,
                document,
                bind,
                port,
            } => {
                log::info!("[serve] dispatched root={}", root.display());
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(SiteError::Serve)?;
                rt.block_on(serve::run_serve(ServeOptions {
                    root,
                    config,
                    document,
                    bind,
                    port,
                }))
            }
            Commands::Toc { file } => print_outline(&file),
        }
    }

    pub fn main() -> ExitCode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();

        match run(Cli::parse()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("[main] {err}");
                eprintln!("Error: {err}");
                ExitCode::FAILURE
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    cli::main()
}

// The browser entry point is `papersite::web::start`; the binary is host-only.
#[cfg(target_arch = "wasm32")]
fn main() {}
