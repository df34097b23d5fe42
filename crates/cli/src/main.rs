//! replica command-line entry point.
//!
//! Clones a page to a single HTML file or packages it as an offline zip
//! archive. Logs go to stderr so documents can be piped from stdout.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use replica_client::{Cloner, FetchConfig, HeaderSet, HeaderTemplate, RelayFetcher};
use replica_core::{AppConfig, ResourceStore, open_store};

#[derive(Parser, Debug)]
#[command(name = "replica", about = "Clone web pages through relay proxies for offline use", version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a page and write it as one HTML document.
    Clone {
        url: String,

        /// Embed stylesheets and images into the document.
        #[arg(long)]
        inline: bool,

        /// Write the document here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        headers: HeaderArgs,
    },

    /// Fetch a page and its resources into a zip archive.
    Archive {
        url: String,

        /// Destination zip file.
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        headers: HeaderArgs,
    },

    /// Inspect or clear the resource cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print the number of cached resources.
    Stats,
    /// Remove every cached resource.
    Clear,
}

#[derive(clap::Args, Debug, Default)]
struct HeaderArgs {
    /// Request header forwarded to every relay, as 'Name: value'.
    ///
    /// Values may contain {{name}} placeholders filled from --var.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Placeholder value for header templates, as name=value.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,
}

impl HeaderArgs {
    /// Build the header set, filling any template placeholders.
    fn resolve(&self) -> Result<HeaderSet> {
        let mut template = HeaderTemplate::new("cli");
        for line in &self.headers {
            let Some((name, value)) = line.split_once(':') else {
                bail!("header must be 'Name: value', got {line:?}");
            };
            template = template.with_header(name.trim(), value.trim());
        }

        let values: HashMap<String, String> = self.vars.iter().cloned().collect();
        Ok(template.fill(&values)?)
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

fn build_cloner(config: &AppConfig, store: Arc<dyn ResourceStore>) -> Result<Cloner> {
    let fetcher = Arc::new(RelayFetcher::new(FetchConfig::from(config))?);
    Ok(Cloner::from_config(config, fetcher, store))
}

async fn cache_command(store: &dyn ResourceStore, action: &CacheAction, config: &AppConfig) -> Result<()> {
    match action {
        CacheAction::Stats => {
            println!("{} resources cached ({})", store.size().await?, config.cache_backend.as_str());
        }
        CacheAction::Clear => {
            let deleted = store.size().await?;
            store.clear().await?;
            println!("removed {deleted} cached resources");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = AppConfig::load()?;
    let store = open_store(&config).await?;

    match cli.command {
        Command::Cache { action } => cache_command(store.as_ref(), &action, &config).await?,
        Command::Clone { url, inline, output, headers } => {
            let headers = headers.resolve()?;
            let cloner = build_cloner(&config, store)?;
            let document = cloner.clone_page(&url, &headers, inline).await.map_err(|e| anyhow::anyhow!(e.user_message()))?;

            if inline {
                eprintln!("{}", document.summary());
                for failure in &document.failed {
                    eprintln!("  not embedded: {} ({})", failure.url, failure.error);
                }
            }

            match output {
                Some(path) => tokio::fs::write(&path, document.html.as_bytes())
                    .await
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(document.html.as_bytes())?,
            }
        }
        Command::Archive { url, output, headers } => {
            let headers = headers.resolve()?;
            let cloner = build_cloner(&config, store)?;
            let archive = cloner
                .clone_archive(&url, &headers, |progress| {
                    eprint!("\rdownloading resources: {}% ({}/{})", progress.percent(), progress.completed, progress.total);
                })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            eprintln!();

            tokio::fs::write(&output, &archive.bytes)
                .await
                .with_context(|| format!("writing {}", output.display()))?;

            eprintln!("{}", archive.summary());
            for resource in &archive.undelivered {
                eprintln!("  not archived: {}", resource.url);
            }
            eprintln!("wrote {} ({} bytes)", output.display(), archive.bytes.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clone() {
        let cli = Cli::try_parse_from([
            "replica", "clone", "https://x.test/", "--inline", "-H", "Accept-Language: en", "-o", "page.html",
        ])
        .unwrap();

        match cli.command {
            Command::Clone { url, inline, output, headers } => {
                assert_eq!(url, "https://x.test/");
                assert!(inline);
                assert_eq!(output, Some(PathBuf::from("page.html")));
                assert_eq!(headers.headers, vec!["Accept-Language: en"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_archive_requires_output() {
        assert!(Cli::try_parse_from(["replica", "archive", "https://x.test/"]).is_err());
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("token=a=b").unwrap(), ("token".to_string(), "a=b".to_string()));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_resolve_fills_placeholders() {
        let args = HeaderArgs {
            headers: vec!["Authorization: Bearer {{token}}".into(), "X-Trace: 1".into()],
            vars: vec![("token".into(), "abc".into())],
        };
        let headers = args.resolve().unwrap();
        let pairs: Vec<_> = headers.iter().map(|(n, v)| (n.as_str().to_string(), v.to_str().unwrap().to_string())).collect();
        assert_eq!(
            pairs,
            vec![("authorization".to_string(), "Bearer abc".to_string()), ("x-trace".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_resolve_missing_variable() {
        let args = HeaderArgs { headers: vec!["Authorization: Bearer {{token}}".into()], vars: Vec::new() };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_resolve_rejects_malformed_line() {
        let args = HeaderArgs { headers: vec!["no colon here".into()], vars: Vec::new() };
        assert!(args.resolve().is_err());
    }
}
