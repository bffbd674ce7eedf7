//! sealbox - operator tool for dispute privacy primitives
//!
//! usage:
//!   sealbox keygen --purpose audit                       # fresh viewing key
//!   sealbox split --secret <hex> -t 3 -n 5               # shamir shares + feldman commitments
//!   sealbox combine <share> <share> <share>              # reconstruct
//!   sealbox commit --dispute d-1 --value "invoice 42"    # pedersen commitment + opening
//!   sealbox verify --published c.json --revelation r.json
//!   sealbox encrypt --to <pk> --purpose audit --message "hi"
//!   sealbox decrypt --purpose audit --data <hex>         # key from SEALBOX_KEY
//!   sealbox init-custodians -c sealbox.toml              # local custodian keys
//!   sealbox escrow -c sealbox.toml --dispute d-1 --secret <hex> --record d-1.json
//!   sealbox recover -c sealbox.toml --record d-1.json
//!
//! every command prints json on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use sealbox::config::{CustodianConfig, SealboxConfig};
use sealbox::escrow::EscrowRecord;
use sealbox::evidence::{evidence_scalar, verify_revelation, PublishedCommitment, Revelation};
use sealbox::{
    Custodian, HolderId, KeyPurpose, KeyShare, LocalCustodian, PedersenParams,
    PrimeField, Sealbox, Secret, ShareCommitments, ThresholdConfig, ViewingKey, ViewingPublicKey,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "sealbox")]
#[command(about = "threshold escrow, evidence commitments and viewing keys")]
#[command(version)]
struct Cli {
    /// config file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "SEALBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// generate or derive a viewing key
    Keygen {
        #[arg(short, long)]
        purpose: KeyPurpose,
        /// derive from this root secret (hex, >= 32 bytes) instead of sampling
        #[arg(long, env = "SEALBOX_ROOT", hide_env_values = true)]
        root: Option<String>,
    },

    /// split a secret into shares
    Split {
        /// secret as big-endian hex
        #[arg(long, env = "SEALBOX_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(short, long)]
        threshold: Option<u32>,
        #[arg(short = 'n', long)]
        shares: Option<u32>,
        /// prime modulus as hex (default: bn254 scalar field)
        #[arg(long)]
        field: Option<String>,
    },

    /// reconstruct a secret from hex-encoded shares
    Combine {
        shares: Vec<String>,
        /// check each share against these commitments first
        #[arg(long)]
        commitments: Option<String>,
    },

    /// commit to evidence bytes for a dispute
    Commit {
        #[arg(short, long)]
        dispute: String,
        #[arg(long)]
        value: String,
    },

    /// check a revelation against its published commitment
    Verify {
        #[arg(long)]
        published: PathBuf,
        #[arg(long)]
        revelation: PathBuf,
    },

    /// encrypt a message to a viewing public key
    Encrypt {
        /// recipient public key, hex
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        purpose: KeyPurpose,
        #[arg(short, long)]
        message: String,
    },

    /// decrypt with a viewing secret key
    Decrypt {
        /// secret key, hex
        #[arg(long, env = "SEALBOX_KEY", hide_env_values = true)]
        key: String,
        #[arg(short, long)]
        purpose: KeyPurpose,
        /// encrypted data, hex
        #[arg(long)]
        data: String,
    },

    /// create keys for the configured local custodians
    InitCustodians,

    /// escrow a secret with the configured custodians
    Escrow {
        #[arg(short, long)]
        dispute: String,
        #[arg(long, env = "SEALBOX_SECRET", hide_env_values = true)]
        secret: String,
        /// where to write the public escrow record
        #[arg(long)]
        record: PathBuf,
    },

    /// recover an escrowed secret
    Recover {
        /// record written by `escrow`
        #[arg(long)]
        record: PathBuf,
        /// override recovery timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("sealbox=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen { purpose, root } => cmd_keygen(purpose, root.as_deref()),
        Commands::Split {
            secret,
            threshold,
            shares,
            field,
        } => cmd_split(&config, &secret, threshold, shares, field.as_deref()),
        Commands::Combine { shares, commitments } => cmd_combine(&shares, commitments.as_deref()),
        Commands::Commit { dispute, value } => cmd_commit(&dispute, value.as_bytes()),
        Commands::Verify {
            published,
            revelation,
        } => cmd_verify(&published, &revelation),
        Commands::Encrypt { to, purpose, message } => cmd_encrypt(&to, purpose, message.as_bytes()),
        Commands::Decrypt { key, purpose, data } => cmd_decrypt(&key, purpose, &data),
        Commands::InitCustodians => cmd_init_custodians(&config).await,
        Commands::Escrow {
            dispute,
            secret,
            record,
        } => cmd_escrow(config, &dispute, &secret, &record).await,
        Commands::Recover {
            record,
            timeout_secs,
        } => cmd_recover(config, &record, timeout_secs).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SealboxConfig> {
    match path {
        Some(path) => SealboxConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(SealboxConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn decode_hex(what: &str, s: &str) -> Result<Zeroizing<Vec<u8>>> {
    let s = s.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(s).with_context(|| format!("{what} is not hex"))?))
}

fn cmd_keygen(purpose: KeyPurpose, root: Option<&str>) -> Result<()> {
    let key = match root {
        Some(root) => ViewingKey::derive(&decode_hex("root", root)?, purpose)?,
        None => ViewingKey::generate(purpose, &mut rand::thread_rng()),
    };
    let secret = Zeroizing::new(hex::encode(*key.secret_bytes()));
    print_json(&json!({
        "purpose": purpose,
        "secret": secret.as_str(),
        "public": hex::encode(key.public_key().to_bytes()),
    }))
}

fn cmd_split(
    config: &SealboxConfig,
    secret: &str,
    threshold: Option<u32>,
    shares: Option<u32>,
    field: Option<&str>,
) -> Result<()> {
    let field = match field {
        Some(modulus) => PrimeField::from_hex(modulus)?,
        None => config.threshold.field.clone(),
    };
    let threshold = ThresholdConfig::new(
        threshold.unwrap_or(config.threshold.threshold),
        shares.unwrap_or(config.threshold.shares),
        field,
    )?;
    let secret = Secret::from_bytes(&decode_hex("secret", secret)?, &threshold.field)?;

    let (shares, commitments) = if threshold.field.is_bn254() {
        let (shares, commitments) = sealbox::split_verifiable(&secret, &threshold)?;
        (shares, Some(hex::encode(commitments.to_bytes()?)))
    } else {
        (sealbox::split(&secret, &threshold)?, None)
    };

    let encoded = shares
        .iter()
        .map(|s| s.to_bytes().map(hex::encode))
        .collect::<sealbox::Result<Vec<_>>>()?;
    info!(t = threshold.threshold, n = threshold.shares, "split secret");
    print_json(&json!({
        "threshold": threshold.threshold,
        "shares": encoded,
        "commitments": commitments,
    }))
}

fn cmd_combine(shares: &[String], commitments: Option<&str>) -> Result<()> {
    let shares = shares
        .iter()
        .map(|s| Ok(KeyShare::from_bytes(&decode_hex("share", s)?)?))
        .collect::<Result<Vec<_>>>()?;

    if let Some(commitments) = commitments {
        let commitments = ShareCommitments::from_bytes(&decode_hex("commitments", commitments)?)?;
        for share in &shares {
            commitments
                .verify_share(share)
                .with_context(|| format!("share {}", share.index))?;
        }
    }

    let secret = sealbox::reconstruct(&shares)?;
    let secret_hex = Zeroizing::new(secret.expose().to_str_radix(16));
    print_json(&json!({ "secret": secret_hex.as_str() }))
}

fn cmd_commit(dispute: &str, value: &[u8]) -> Result<()> {
    let params = PedersenParams::new();
    let (commitment, opening) =
        params.commit_random(evidence_scalar(dispute, value), &mut rand::thread_rng());
    let published = PublishedCommitment {
        dispute_id: dispute.to_string(),
        commitment,
    };
    let revelation = Revelation {
        dispute_id: dispute.to_string(),
        value: value.to_vec(),
        opening,
    };
    print_json(&json!({ "published": published, "revelation": revelation }))
}

fn cmd_verify(published: &Path, revelation: &Path) -> Result<()> {
    let published: PublishedCommitment = serde_json::from_slice(
        &std::fs::read(published).with_context(|| format!("reading {}", published.display()))?,
    )?;
    let revelation: Revelation = serde_json::from_slice(
        &std::fs::read(revelation).with_context(|| format!("reading {}", revelation.display()))?,
    )?;

    verify_revelation(&PedersenParams::new(), &published, &revelation)
        .with_context(|| format!("dispute {}", published.dispute_id))?;
    print_json(&json!({ "dispute": published.dispute_id, "valid": true }))
}

fn cmd_encrypt(to: &str, purpose: KeyPurpose, message: &[u8]) -> Result<()> {
    let recipient = ViewingPublicKey::from_bytes(purpose, &decode_hex("public key", to)?)?;
    let data = sealbox::viewing::encrypt(message, &recipient, purpose)?;
    print_json(&json!({ "purpose": purpose, "data": hex::encode(data.to_bytes()?) }))
}

fn cmd_decrypt(key: &str, purpose: KeyPurpose, data: &str) -> Result<()> {
    let raw = decode_hex("key", key)?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("key must be 32 bytes"))?;
    let key = ViewingKey::from_secret_bytes(purpose, bytes)?;
    let plaintext = Zeroizing::new(key.decrypt_bytes(&decode_hex("data", data)?, &[])?);
    print_json(&json!({ "message": String::from_utf8_lossy(&plaintext) }))
}

async fn cmd_init_custodians(config: &SealboxConfig) -> Result<()> {
    let CustodianConfig::Local { dir, holders } = &config.custodian else {
        bail!("init-custodians only applies to the local backend");
    };

    let mut out = Vec::with_capacity(holders.len());
    for holder in holders {
        let custodian = LocalCustodian::create(dir, HolderId::new(holder)?)
            .await
            .with_context(|| format!("creating {holder}"))?;
        out.push(json!({
            "holder": holder,
            "public_key": hex::encode(custodian.share_holder().public_key.to_bytes()),
        }));
    }
    print_json(&out)
}

async fn cmd_escrow(config: SealboxConfig, dispute: &str, secret: &str, record: &Path) -> Result<()> {
    let sealbox = Sealbox::from_config(config).await?;
    let secret = Secret::from_bytes(&decode_hex("secret", secret)?, &sealbox.threshold().field)?;
    let distribution = sealbox.escrow_secret(dispute, &secret).await?;

    std::fs::write(record, serde_json::to_vec_pretty(&distribution.record)?)
        .with_context(|| format!("writing {}", record.display()))?;
    print_json(&json!({
        "dispute": dispute,
        "holders": distribution.envelopes.iter().map(|e| e.holder.to_string()).collect::<Vec<_>>(),
        "record": record,
    }))
}

async fn cmd_recover(mut config: SealboxConfig, record: &Path, timeout_secs: Option<u64>) -> Result<()> {
    if let Some(secs) = timeout_secs {
        config.recovery.timeout_secs = secs;
    }
    let record: EscrowRecord = serde_json::from_slice(
        &std::fs::read(record).with_context(|| format!("reading {}", record.display()))?,
    )?;
    let dispute = record.dispute_id.clone();

    let sealbox = Sealbox::from_config(config).await?;
    sealbox.escrow().register(record)?;
    let secret = sealbox.recover_secret(&dispute).await?;
    let secret_hex = Zeroizing::new(secret.expose().to_str_radix(16));
    print_json(&json!({ "dispute": dispute, "secret": secret_hex.as_str() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_split_combine_flags() {
        let cli = Cli::try_parse_from(["sealbox", "split", "--secret", "ff", "-t", "2", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Split {
                threshold, shares, ..
            } => {
                assert_eq!(threshold, Some(2));
                assert_eq!(shares, Some(3));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_purpose_parses() {
        let cli = Cli::try_parse_from(["sealbox", "keygen", "--purpose", "escrow"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Keygen {
                purpose: KeyPurpose::Escrow,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["sealbox", "keygen", "--purpose", "nope"]).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sealbox.toml");
        std::fs::write(&path, "[threshold]\nthreshold = 1\nshares = 3\n").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().threshold.threshold, 1);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[tokio::test]
    async fn test_init_escrow_recover() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SealboxConfig::default();
        config.custodian = CustodianConfig::Local {
            dir: dir.path().to_path_buf(),
            holders: vec!["a".into(), "b".into(), "c".into()],
        };
        let record = dir.path().join("d-1.json");

        cmd_init_custodians(&config).await.unwrap();
        cmd_escrow(config.clone(), "d-1", "0badc0de", &record).await.unwrap();
        cmd_recover(config, &record, Some(5)).await.unwrap();
    }
}
