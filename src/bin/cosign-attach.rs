//
// Copyright 2025 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Attach attestations to container images, and download the signatures and
//! attestations attached to them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use docker_credential::{CredentialRetrievalError, DockerCredential};
use sigstore_attach::cosign::{Client, ClientBuilder, CosignCapabilities};
use sigstore_attach::registry::{
    Auth, Certificate, CertificateEncoding, ClientConfig, ClientProtocol, OciReference,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cosign-attach", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip the verification of the TLS certificates of the registries
    #[arg(long, global = true)]
    allow_insecure_registry: bool,

    /// Talk with the registries over plain HTTP
    #[arg(long, global = true)]
    allow_http_registry: bool,

    /// PEM file with an additional CA trusted when talking with the registries
    #[arg(long = "registry-ca", global = true)]
    registry_cas: Vec<PathBuf>,

    /// Username used to authenticate against the registry
    #[arg(long, global = true, requires = "password")]
    username: Option<String>,

    /// Password used to authenticate against the registry
    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    /// Abort the operation after the given number of seconds
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attach artifacts to an image
    Attach {
        #[command(subcommand)]
        artifact: AttachCommands,
    },
    /// Download the artifacts attached to an image
    Download {
        #[command(subcommand)]
        artifact: DownloadCommands,
    },
}

#[derive(Subcommand, Debug)]
enum AttachCommands {
    /// Attach in-toto attestations, wrapped in DSSE envelopes, to an image
    Attestation {
        /// File holding one or more DSSE envelopes
        #[arg(long = "attestation", required = true)]
        attestations: Vec<PathBuf>,

        /// Expected digest of the image, checked before attaching anything
        #[arg(long)]
        digest: Option<String>,

        /// Image reference
        image: String,
    },
}

#[derive(Subcommand, Debug)]
enum DownloadCommands {
    /// Print the signatures attached to an image, one JSON object per line
    Signature {
        /// Expected digest of the image
        #[arg(long)]
        digest: Option<String>,

        /// Image reference
        image: String,
    },
    /// Print the attestations attached to an image, one JSON object per line
    Attestation {
        /// Expected digest of the image
        #[arg(long)]
        digest: Option<String>,

        /// Image reference
        image: String,
    },
}

impl Commands {
    fn image(&self) -> &str {
        match self {
            Commands::Attach {
                artifact: AttachCommands::Attestation { image, .. },
            } => image,
            Commands::Download {
                artifact: DownloadCommands::Signature { image, .. },
            } => image,
            Commands::Download {
                artifact: DownloadCommands::Attestation { image, .. },
            } => image,
        }
    }
}

fn build_auth(cli: &Cli) -> Auth {
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        return Auth::Basic(username.clone(), password.clone());
    }

    let reference: OciReference = match cli.command.image().parse() {
        Ok(reference) => reference,
        // reported later on, when the reference is resolved
        Err(_) => return Auth::Anonymous,
    };
    let server = reference
        .resolve_registry()
        .strip_suffix('/')
        .unwrap_or_else(|| reference.resolve_registry());
    match docker_credential::get_credential(server) {
        Err(CredentialRetrievalError::ConfigNotFound) => Auth::Anonymous,
        Err(CredentialRetrievalError::NoCredentialConfigured) => Auth::Anonymous,
        Err(e) => {
            warn!("Error handling docker configuration file: {}", e);
            Auth::Anonymous
        }
        Ok(DockerCredential::UsernamePassword(username, password)) => {
            debug!("Found docker credentials");
            Auth::Basic(username, password)
        }
        Ok(DockerCredential::IdentityToken(_)) => {
            warn!(
                "Cannot use contents of docker config, identity token not supported. Using anonymous auth"
            );
            Auth::Anonymous
        }
    }
}

fn build_client(cli: &Cli) -> anyhow::Result<Client> {
    let mut oci_client_config = ClientConfig::default();
    if cli.allow_http_registry {
        oci_client_config.protocol = ClientProtocol::Http;
    }
    oci_client_config.accept_invalid_certificates = cli.allow_insecure_registry;
    for path in &cli.registry_cas {
        let data = std::fs::read(path)
            .map_err(|e| anyhow!("Cannot read registry CA {}: {e}", path.display()))?;
        oci_client_config.extra_root_certificates.push(Certificate {
            encoding: CertificateEncoding::Pem,
            data,
        });
    }

    ClientBuilder::default()
        .with_oci_client_config(oci_client_config)
        .with_auth(build_auth(cli))
        .build()
        .map_err(|e| anyhow!("Cannot build cosign client: {e}"))
}

async fn run_app(cli: &Cli, client: &Client, cancel: &CancellationToken) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Attach {
            artifact:
                AttachCommands::Attestation {
                    attestations,
                    digest,
                    image,
                },
        } => {
            let published = client
                .attach_attestations(image, attestations, digest.as_deref(), cancel)
                .await?;
            debug!(published, "attestations attached");
        }
        Commands::Download {
            artifact: DownloadCommands::Signature { digest, image },
        } => {
            for signature in client
                .fetch_signatures_for_reference(image, digest.as_deref(), cancel)
                .await?
            {
                println!("{}", serde_json::to_string(&signature)?);
            }
        }
        Commands::Download {
            artifact: DownloadCommands::Attestation { digest, image },
        } => {
            for attestation in client
                .fetch_attestations_for_reference(image, digest.as_deref(), cancel)
                .await?
            {
                println!("{}", serde_json::to_string(&attestation)?);
            }
        }
    }
    Ok(())
}

/// Directives from `RUST_LOG` win over the `--verbose` flag. Invalid
/// directives fall back to the flag.
fn log_filter(verbose: bool, rust_log: Option<String>) -> EnvFilter {
    let level_filter = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level_filter))
}

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();

    // setup logging
    let filter_layer = log_filter(cli.verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = match build_client(&cli) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    let timeout = Duration::from_secs(cli.timeout);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!("timeout of {}s reached, aborting", timeout.as_secs());
        deadline.cancel();
    });

    if let Err(e) = run_app(&cli, &client, &cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
