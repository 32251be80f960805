use std::{
    io::{self, Write},
    panic,
    sync::Once,
};

use tracing_subscriber::filter::LevelFilter;
use windows::{core::HSTRING, Win32::System::Diagnostics::Debug::OutputDebugStringW};

const PREFIX: &str = "[hide-on-close] ";

/// Sends each formatted event to the debugger of whichever process hosts us.
struct DebugOutput;

impl Write for DebugOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = format!("{PREFIX}{}", String::from_utf8_lossy(buf));
        unsafe { OutputDebugStringW(&HSTRING::from(line)) };
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if cfg!(debug_assertions) {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };

        let _ = tracing_subscriber::fmt()
            .with_writer(|| DebugOutput)
            .with_ansi(false)
            .without_time()
            .with_max_level(level)
            .try_init();

        panic::set_hook(Box::new(|info| {
            tracing::error!("== Panic == {info}");
        }));
    });
}

pub fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "<unknown>".to_owned())
}
