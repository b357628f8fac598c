// main.rs - jarsig CLI entry point

mod cli;
mod sign;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, Source};
use jarsig::jar::{
    inspect_archive, ArchiveReader, Certificate, DirArchive, JarFile, JarSigner, MemoryArchive,
    Verdict,
};
use jarsig::VerifyConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Keygen { output } => cmd_keygen(output),
        Commands::Sign {
            dir,
            keyfile,
            signer,
            subject,
            algorithm,
        } => cmd_sign(&dir, keyfile.as_deref(), &signer, &subject, algorithm.into()),
        Commands::Verify { source, verbose } => {
            let verdict = cmd_verify(&source, verbose)?;
            if !verdict.is_intact() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn cmd_keygen(output: Option<PathBuf>) -> Result<()> {
    let (sk, pk) = sign::keygen();
    let dir = output.unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)?;

    let sk_path = dir.join("jarsig.sk");
    let pk_path = dir.join("jarsig.pk");

    fs::write(&sk_path, sk.as_bytes())?;
    fs::write(&pk_path, &pk)?;

    eprintln!("Ed25519 keypair generated:");
    eprintln!("  Secret key: {}", sk_path.display());
    eprintln!("  Public key: {}", pk_path.display());
    eprintln!();
    eprintln!("Public key (base64): {}", pk);
    eprintln!();
    eprintln!("To sign without a keyfile, set:");
    eprintln!("  {}=<contents of {}>", sign::SECRET_KEY_ENV, sk_path.display());

    Ok(())
}

fn cmd_sign(
    dir: &Path,
    keyfile: Option<&Path>,
    signer: &str,
    subject: &str,
    algorithm: jarsig::hash::DigestAlgorithm,
) -> Result<()> {
    let key = sign::load_secret_key(keyfile)?;
    let chain = vec![Certificate::self_signed(subject, &key.verifying_key())];
    let signer = JarSigner::new(key, chain, signer)
        .context("invalid signer name")?
        .with_algorithm(algorithm);

    let archive =
        DirArchive::open(dir).with_context(|| format!("opening {}", dir.display()))?;
    let signed = signer
        .sign(&archive)
        .with_context(|| format!("signing {}", dir.display()))?;

    for (name, data) in signed.files() {
        archive
            .write_file(&name, data)
            .with_context(|| format!("writing {name}"))?;
    }

    eprintln!("[jarsig] Signed {} entries", signed.names.len());
    eprintln!("  Signer: {}", signer.signer_name());
    eprintln!("  Subject: {}", subject);
    eprintln!("  Signature file: {}", signed.signature_file_name());
    eprintln!("  Block: {}", signed.block_name());

    Ok(())
}

fn cmd_verify(source: &Source, verbose: bool) -> Result<Verdict> {
    let config = VerifyConfig::from_env();
    match (&source.dir, &source.tar) {
        (Some(dir), _) => {
            let archive =
                DirArchive::open(dir).with_context(|| format!("opening {}", dir.display()))?;
            eprintln!("[jarsig] Verifying directory: {}", dir.display());
            verify_jar(JarFile::open(archive).with_config(config), verbose)
        }
        (None, Some(tar)) => {
            let file = fs::File::open(tar).with_context(|| format!("opening {}", tar.display()))?;
            let archive = MemoryArchive::from_tar(file, config.max_entry_size)
                .with_context(|| format!("reading tar {}", tar.display()))?;
            eprintln!("[jarsig] Verifying tar archive: {}", tar.display());
            verify_jar(JarFile::open(archive).with_config(config), verbose)
        }
        (None, None) => anyhow::bail!("pass --dir or --tar"),
    }
}

fn verify_jar<A: ArchiveReader>(jar: JarFile<A>, verbose: bool) -> Result<Verdict> {
    let report = inspect_archive(&jar).context("verifying archive")?;

    if verbose {
        for entry in &report.entries {
            let mark = if entry.signers.is_some() { "sm" } else { "  " };
            eprintln!("  {} {}", mark, entry.name);
        }
    }
    for cert in report.signer_certificates() {
        eprintln!("[jarsig] Signer: {} (key {})", cert, &cert.fingerprint()[..16]);
    }
    let digests = jar.manifest_digests()?;
    if verbose && !digests.is_empty() {
        eprintln!("[jarsig] Manifest digests asserted: {}", digests.join(", "));
    }

    match &report.verdict {
        Verdict::Verified => eprintln!("[jarsig] VERIFIED: all entries signed and intact"),
        Verdict::PartiallySigned(unsigned) => {
            eprintln!("[jarsig] VERIFIED WITH WARNINGS: {} unsigned entries", unsigned.len());
            for name in unsigned {
                eprintln!("  - {}", name);
            }
        }
        Verdict::Unsigned => eprintln!("[jarsig] UNSIGNED: no usable signature found"),
        Verdict::Tampered(problems) => {
            eprintln!("[jarsig] TAMPERED:");
            for problem in problems {
                eprintln!("  - {}", problem);
            }
        }
    }

    Ok(report.verdict)
}
