// cli.rs - Command-line interface definitions (clap derive)
//
//   jarsig keygen   - generate an Ed25519 keypair
//   jarsig sign     - sign an exploded JAR directory in place
//   jarsig verify   - verify a JAR directory or tar archive

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use jarsig::hash::DigestAlgorithm;

#[derive(Parser)]
#[command(name = "jarsig")]
#[command(about = "jarsig - JAR manifest signing and verification")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an Ed25519 keypair for signing
    Keygen {
        /// Output directory for key files (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write MANIFEST.MF, <SIGNER>.SF and <SIGNER>.EC into a JAR directory
    Sign {
        /// Exploded JAR directory
        #[arg(long)]
        dir: PathBuf,

        /// Path to Ed25519 secret key file
        #[arg(long)]
        keyfile: Option<PathBuf>,

        /// Base name of the signature files
        #[arg(long, default_value = "SIGNER")]
        signer: String,

        /// Subject recorded in the signer certificate
        #[arg(long, default_value = "CN=jarsig")]
        subject: String,

        /// Digest algorithm for manifest and signature file entries
        #[arg(long, value_enum, default_value_t = Algorithm::Sha256)]
        algorithm: Algorithm,
    },

    /// Verify every entry of a JAR
    Verify {
        #[command(flatten)]
        source: Source,

        /// Print each entry with its signers
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct Source {
    /// Exploded JAR directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Tar archive holding the JAR entries
    #[arg(long)]
    pub tar: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl From<Algorithm> for DigestAlgorithm {
    fn from(alg: Algorithm) -> Self {
        match alg {
            Algorithm::Sha256 => DigestAlgorithm::Sha256,
            Algorithm::Sha384 => DigestAlgorithm::Sha384,
            Algorithm::Sha512 => DigestAlgorithm::Sha512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verify_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["jarsig", "verify"]).is_err());
        assert!(Cli::try_parse_from(["jarsig", "verify", "--dir", "a", "--tar", "b"]).is_err());
        assert!(Cli::try_parse_from(["jarsig", "verify", "--tar", "b.tar", "-v"]).is_ok());
    }
}
