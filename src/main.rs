use std::env;
use std::path::Path;
use std::process::ExitCode;

use leech_torrent::config::Cfg;
use leech_torrent::error::ClientError;
use leech_torrent::logger::Logger;
use leech_torrent::metainfo::TorrentMeta;
use leech_torrent::orchestrator::Orchestrator;
use leech_torrent::storage::PieceStorage;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ClientError> {
    let arguments: Vec<String> = env::args().collect();
    let (output_directory, torrent_path) = parse_arguments(&arguments)?;

    if !Path::new(&output_directory).is_dir() {
        return Err(ClientError::Usage(format!(
            "output directory does not exist: {output_directory}"
        )));
    }

    let config = Cfg::default();
    let logger = Logger::new(&config.log_directory)
        .map_err(|err| ClientError::Usage(format!("could not start logger: {err:?}")))?;
    let sender = logger.new_sender();

    sender.info(&format!("loading torrent {torrent_path}"));
    let meta = TorrentMeta::load(Path::new(&torrent_path))?;

    let storage = PieceStorage::new(&meta, Path::new(&output_directory))?;
    let orchestrator = Orchestrator::new(&meta, storage, config, sender);
    orchestrator.run(&meta)
}

/// Parses `program -d <output_directory> <torrent_file>`, hand-rolled since
/// CLI parsing beyond this glue is out of scope.
fn parse_arguments(arguments: &[String]) -> Result<(String, String), ClientError> {
    let mut output_directory = None;
    let mut torrent_path = None;

    let mut iter = arguments.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "-d" {
            output_directory = iter.next().cloned();
        } else {
            torrent_path = Some(arg.clone());
        }
    }

    match (output_directory, torrent_path) {
        (Some(dir), Some(path)) => Ok((dir, path)),
        _ => Err(ClientError::Usage(
            "usage: leech_torrent -d <output_directory> <torrent_file>".to_string(),
        )),
    }
}
