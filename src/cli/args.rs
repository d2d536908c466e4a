//! CLI argument definitions
// (c) 2025 Ross Younger

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Port both sides use unless told otherwise
const DEFAULT_PORT: u16 = 4433;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub(crate) struct CliArgs {
    /// Mode to run the application in
    #[command(subcommand)]
    pub mode: Mode,

    /// Enables detailed debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Uploads a video file to a server, or downloads one from it
    Client(ClientOptions),
    /// Serves video files to clients
    Server(ServerOptions),
}

/// Options for client mode
#[derive(Debug, Args)]
pub(crate) struct ClientOptions {
    /// Host to connect to
    #[arg(short, long, default_value = "localhost")]
    pub server: String,

    /// Port to connect to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Certificate to trust (for self-signed servers)
    #[arg(short, long, default_value = "certs/qvtp-cert.pem")]
    pub cert_file: PathBuf,

    /// Path to the video file
    #[arg(short, long)]
    pub video_path: PathBuf,

    /// Download the video instead of uploading it
    #[arg(short, long)]
    pub download: bool,
}

/// Options for server mode
#[derive(Debug, Args)]
pub(crate) struct ServerOptions {
    /// Address to listen on
    #[arg(short, long, default_value = "localhost")]
    pub listen: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Certificate file (a self-signed pair is generated here if absent)
    #[arg(short, long, default_value = "certs/qvtp-cert.pem")]
    pub cert_file: PathBuf,

    /// Private key file (a self-signed pair is generated here if absent)
    #[arg(short, long, default_value = "certs/qvtp-key.pem")]
    pub key_file: PathBuf,

    /// Directory served to clients and receiving uploads
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,
}

#[cfg(test)]
mod test {
    use clap::Parser as _;
    use pretty_assertions::assert_eq;

    use super::{CliArgs, Mode};

    #[test]
    fn client_args() {
        let args =
            CliArgs::try_parse_from(["qvtp", "client", "-v", "movie.mp4", "-d", "-s", "example.com"])
                .unwrap();
        let Mode::Client(options) = args.mode else {
            panic!("expected client mode");
        };
        assert_eq!(options.server, "example.com");
        assert_eq!(options.port, 4433);
        assert!(options.download);
        assert_eq!(options.video_path.to_str().unwrap(), "movie.mp4");
    }

    #[test]
    fn server_args() {
        let args = CliArgs::try_parse_from(["qvtp", "server", "-p", "9999", "-r", "/srv"]).unwrap();
        let Mode::Server(options) = args.mode else {
            panic!("expected server mode");
        };
        assert_eq!(options.listen, "localhost");
        assert_eq!(options.port, 9999);
        assert_eq!(options.root.to_str().unwrap(), "/srv");
    }

    #[test]
    fn video_path_is_required() {
        assert!(CliArgs::try_parse_from(["qvtp", "client"]).is_err());
    }

    #[test]
    fn mode_is_required() {
        assert!(CliArgs::try_parse_from(["qvtp"]).is_err());
    }
}
