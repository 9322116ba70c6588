// ABOUTME: Keygen utility producing the deployment's RSA keypair as PEM files
// ABOUTME: The private key stays with the SSO; the public key is dropped to relying apps
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![forbid(unsafe_code)]

//! Generates the RSA keypair referenced by `JWT_PRIVATE_KEY_PATH` /
//! `JWT_PUBLIC_KEY_PATH`. Run once per deployment; distribute only the
//! public key to relying applications.

use anyhow::{Context, Result};
use clap::Parser;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sso-keygen")]
#[command(about = "Generate the RSA keypair used to sign SSO tokens")]
struct Args {
    /// Where to write the private key PEM
    #[arg(long, default_value = "keys/private.pem")]
    private_key: PathBuf,

    /// Where to write the public key PEM
    #[arg(long, default_value = "keys/public.pem")]
    public_key: PathBuf,

    /// RSA modulus size in bits
    #[arg(long, default_value_t = 2048)]
    bits: usize,

    /// Overwrite existing key files
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.force && (args.private_key.exists() || args.public_key.exists()) {
        anyhow::bail!(
            "refusing to overwrite existing keys at {} / {} (pass --force)",
            args.private_key.display(),
            args.public_key.display()
        );
    }

    println!("generating {}-bit RSA keypair...", args.bits);
    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, args.bits).context("key generation failed")?;
    let public_key = RsaPublicKey::from(&private_key);

    if let Some(parent) = args.private_key.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = args.public_key.parent() {
        std::fs::create_dir_all(parent)?;
    }

    private_key
        .write_pkcs8_pem_file(&args.private_key, LineEnding::LF)
        .context("failed to write private key")?;
    public_key
        .write_public_key_pem_file(&args.public_key, LineEnding::LF)
        .context("failed to write public key")?;

    println!("private key: {}", args.private_key.display());
    println!("public key:  {}", args.public_key.display());
    println!("distribute ONLY the public key to relying applications");
    Ok(())
}
