// Strata - layered multi-mode encryption
// In-process demo, mode selection and envelope inspection

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use strata::config::EngineConfig;
use strata::crypto::kyber::KeyPair;
use strata::crypto::signing::{SignatureAlgorithm, SigningKeyPair};
use strata::engine::{ModeSelector, PipelineEngine};
use strata::signature;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Layered multi-mode encryption with post-quantum key transport", long_about = None)]
struct Args {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt, decrypt, sign and verify in-process
    Demo {
        /// Message to protect
        #[arg(short, long, conflicts_with = "size")]
        message: Option<String>,

        /// Use a synthetic payload of this many bytes instead
        #[arg(short, long)]
        size: Option<usize>,

        /// Seal to the engine's local secret instead of a Kyber-1024 recipient
        #[arg(long)]
        local: bool,

        /// Signature algorithm
        #[arg(long, value_enum, default_value_t = SigningChoice::Dilithium3)]
        sign: SigningChoice,

        /// Also write the sealed envelope here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the mode selected for a payload size
    Select {
        /// Payload size in bytes
        size: usize,
    },

    /// Parse an envelope file and print its header and layer records
    Inspect {
        /// Envelope file
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SigningChoice {
    Dilithium3,
    Ed25519,
}

impl From<SigningChoice> for SignatureAlgorithm {
    fn from(choice: SigningChoice) -> Self {
        match choice {
            SigningChoice::Dilithium3 => SignatureAlgorithm::Dilithium3,
            SigningChoice::Ed25519 => SignatureAlgorithm::Ed25519,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Demo {
            message,
            size,
            local,
            sign,
            out,
        } => {
            let payload = match (message, size) {
                (Some(message), _) => message.into_bytes(),
                (None, Some(size)) => (0..size).map(|i| (i % 251) as u8).collect(),
                (None, None) => b"hello".to_vec(),
            };
            run_demo(config, &payload, local, sign.into(), out)
        }
        Commands::Select { size } => {
            let mode = ModeSelector::select(size, &config);
            let layers = mode.layer_count();
            println!(
                "{} bytes -> {} ({} layer{})",
                size,
                mode,
                layers,
                if layers == 1 { "" } else { "s" }
            );
            Ok(())
        }
        Commands::Inspect { path } => run_inspect(config, &path),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn run_demo(
    config: EngineConfig,
    payload: &[u8],
    local: bool,
    algorithm: SignatureAlgorithm,
    out: Option<PathBuf>,
) -> Result<()> {
    let engine = PipelineEngine::new(config)?;
    println!("Strata - {}", engine.security_level());
    println!("----------------------------------------");

    let recipient = if local { None } else { Some(KeyPair::generate()?) };

    let sealed = engine.encrypt(payload, recipient.as_ref().map(|kp| kp.public_key()))?;
    let envelope = engine.inspect(&sealed)?;

    println!("Mode:        {}", envelope.mode());
    println!("Layers:      {}", envelope.layer_count());
    println!("Plaintext:   {} bytes", payload.len());
    println!(
        "Envelope:    {} bytes (+{} overhead)",
        sealed.len(),
        sealed.len().saturating_sub(payload.len())
    );

    let opened = engine.decrypt(&sealed, recipient.as_ref())?;
    if opened != payload {
        bail!("decrypted payload does not match the original");
    }
    println!("Decrypt:     ok");

    let signer = SigningKeyPair::generate(algorithm);
    let sig = signature::sign(payload, &signer)?;
    let valid = signature::verify(payload, &sig, &signer.verifying_key());
    println!(
        "Signature:   {} ({} bytes, {})",
        algorithm.name(),
        sig.as_bytes().len(),
        if valid { "verified" } else { "INVALID" }
    );
    if !valid {
        bail!("signature failed to verify");
    }

    if let Some(path) = out {
        std::fs::write(&path, &sealed).with_context(|| format!("writing {}", path.display()))?;
        println!("Written:     {}", path.display());
    }

    Ok(())
}

fn run_inspect(config: EngineConfig, path: &std::path::Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let engine = PipelineEngine::new(config)?;
    let envelope = engine.inspect(&bytes)?;

    println!("Version:     {}", envelope.version());
    println!("Mode:        {}", envelope.mode());
    println!("Layers:      {}", envelope.layer_count());

    for (index, record) in envelope.records().iter().enumerate() {
        println!(
            "  [{}] {:<28} nonce={} tag={} len={}",
            index,
            record.algorithm.name(),
            hex::encode(record.nonce),
            hex::encode(record.tag),
            record.ciphertext_len
        );
    }

    println!("Ciphertext:  {} bytes", envelope.ciphertext().len());
    Ok(())
}
