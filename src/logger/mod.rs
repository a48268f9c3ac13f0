//! Channel-based logger: every sender writes into an `mpsc` channel; one
//! dedicated thread drains it to a timestamped log file.
//!
//! Grounded on `logger/logger_receiver.rs` and `logger/logger_sender.rs` for
//! the channel/writer-thread split and the `[%Y/%m/%d %H:%M:%S]` timestamp
//! format. A bounded in-memory ring buffer of the last 1000 formatted lines
//! is new here, so the orchestrator's progress snapshot can show recent
//! activity without re-reading the log file from disk.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::Write;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::Local;

const RING_BUFFER_CAPACITY: usize = 1000;
const LOGGER_THREAD_NAME: &str = "logger";

#[derive(Debug)]
pub enum LoggerError {
    SpawnThreadError,
    SendError(String),
    BadLogPathError(String),
}

/// A cheaply-cloneable handle used by every thread that wants to log.
#[derive(Debug, Clone)]
pub struct LoggerSender {
    sender: Sender<String>,
}

impl LoggerSender {
    pub fn info(&self, message: &str) {
        self.emit("INFO", message);
    }

    pub fn warn(&self, message: &str) {
        self.emit("WARN", message);
    }

    pub fn error(&self, message: &str) {
        self.emit("ERROR", message);
    }

    fn emit(&self, level: &str, message: &str) {
        // A closed receiver (writer thread gone) means the process is
        // shutting down; dropping the line is acceptable.
        let _ = self.sender.send(format!("[{level}] {message}"));
    }
}

/// Owns the writer thread and the shared ring buffer of recent log lines.
pub struct Logger {
    sender: LoggerSender,
    recent: Arc<Mutex<VecDeque<String>>>,
}

impl Logger {
    /// Creates `dir_path` if needed, opens a new timestamped log file inside
    /// it, and spawns the writer thread.
    pub fn new(dir_path: &str) -> Result<Self, LoggerError> {
        fs::create_dir_all(dir_path).map_err(|_| LoggerError::BadLogPathError(dir_path.to_string()))?;
        let file = Self::create_log_file(dir_path)?;

        let (sender, receiver): (Sender<String>, Receiver<String>) = channel();
        let recent = Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_CAPACITY)));

        Self::spawn_writer(receiver, file, Arc::clone(&recent))?;

        Ok(Logger {
            sender: LoggerSender { sender },
            recent,
        })
    }

    pub fn new_sender(&self) -> LoggerSender {
        self.sender.clone()
    }

    /// The most recent formatted log lines, oldest first.
    pub fn recent_lines(&self) -> Vec<String> {
        self.recent
            .lock()
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn create_log_file(dir_path: &str) -> Result<File, LoggerError> {
        let time = Local::now();
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(format!("{}/{}.log", dir_path, time.format("%Y-%m-%d_%H-%M-%S")))
            .map_err(|_| LoggerError::BadLogPathError(dir_path.to_string()))
    }

    fn spawn_writer(
        receiver: Receiver<String>,
        mut file: File,
        recent: Arc<Mutex<VecDeque<String>>>,
    ) -> Result<(), LoggerError> {
        let builder = thread::Builder::new().name(LOGGER_THREAD_NAME.to_string());
        builder
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let line = format!("{} {}", Local::now().format("[%Y/%m/%d %H:%M:%S]"), message);

                    if let Ok(mut buffer) = recent.lock() {
                        if buffer.len() == RING_BUFFER_CAPACITY {
                            buffer.pop_front();
                        }
                        buffer.push_back(line.clone());
                    }

                    if let Err(err) = writeln!(file, "{line}") {
                        eprintln!("error writing to log: {err}");
                    }
                }
            })
            .map(|_| ())
            .map_err(|_| LoggerError::SpawnThreadError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn bad_directory_is_rejected() {
        // A path under a file (not a directory) cannot be created.
        let blocking_file = "./test_logger_blocking_file";
        fs::write(blocking_file, b"x").unwrap();
        let result = Logger::new(&format!("{blocking_file}/nested"));
        assert!(result.is_err());
        fs::remove_file(blocking_file).unwrap();
    }

    #[test]
    fn writes_formatted_lines_and_keeps_recent_buffer() {
        let dir = "./test_logger_writes";
        fs::create_dir_all(dir).unwrap();

        let logger = Logger::new(dir).unwrap();
        let sender = logger.new_sender();
        sender.info("hello");
        sender.warn("careful");
        sender.error("boom");

        sleep(Duration::from_millis(100));

        let recent = logger.recent_lines();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].contains("[INFO] hello"));
        assert!(recent[1].contains("[WARN] careful"));
        assert!(recent[2].contains("[ERROR] boom"));

        let log_files: Vec<_> = fs::read_dir(dir).unwrap().collect();
        assert_eq!(log_files.len(), 1);
        let log_file = File::open(log_files[0].as_ref().unwrap().path()).unwrap();
        let lines: Vec<String> = BufReader::new(log_file)
            .lines()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines.len(), 3);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn multiple_senders_share_one_writer() {
        let dir = "./test_logger_multi_sender";
        fs::create_dir_all(dir).unwrap();

        let logger = Logger::new(dir).unwrap();
        let sender_a = logger.new_sender();
        let sender_b = logger.new_sender();

        let handle_a = thread::spawn(move || sender_a.info("from a"));
        let handle_b = thread::spawn(move || sender_b.info("from b"));
        handle_a.join().unwrap();
        handle_b.join().unwrap();

        sleep(Duration::from_millis(100));
        assert_eq!(logger.recent_lines().len(), 2);

        fs::remove_dir_all(dir).unwrap();
    }
}
