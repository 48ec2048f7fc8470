use core::fmt::Arguments;
use mfrc522_cli::{error, Mfrc522Log, Mfrc522Tool};
use std::cell::Cell;
use termion::color;

struct Mfrc522Logger {
    color: Cell<bool>,
}

impl Mfrc522Logger {
    fn new() -> Mfrc522Logger {
        Mfrc522Logger {
            color: Cell::new(true),
        }
    }

    fn colored<C: color::Color>(self: &Self, fg: C, label: &str, args: Arguments) {
        if self.color.get() {
            eprintln!(
                "{}{}: {}{}",
                color::Fg(fg),
                label,
                args,
                color::Fg(color::Reset)
            );
        } else {
            eprintln!("{}: {}", label, args);
        }
    }
}

impl Mfrc522Log for Mfrc522Logger {
    fn output(self: &Self, args: Arguments) {
        println!("{}", args);
    }
    fn warning(self: &Self, args: Arguments) {
        self.colored(color::Yellow, "warning", args);
    }
    fn error(self: &Self, args: Arguments) {
        self.colored(color::Red, "error", args);
    }
    fn debug(self: &Self, args: Arguments) {
        self.colored(color::LightBlack, "debug", args);
    }
    fn set_color(self: &Self, color: bool) {
        self.color.set(color);
    }
}

fn main() {
    let logger = Mfrc522Logger::new();

    if let Err(error) = Mfrc522Tool::new(&logger).run(std::env::args_os()) {
        error!(logger, "{}", error);
        std::process::exit(1);
    }
}
