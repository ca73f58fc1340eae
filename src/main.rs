use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead};
use std::rc::Rc;

use anyhow::{Context, Result, bail};

use quill::interpreter::Interpreter;

/// Lazily pulls characters from a line-based reader, so each statement runs
/// as soon as it is complete instead of waiting for end of input.
struct SourceChars<R: BufRead> {
    reader: R,
    pending: VecDeque<char>,
    failure: Rc<RefCell<Option<io::Error>>>,
}

impl<R: BufRead> SourceChars<R> {
    fn new(reader: R, failure: Rc<RefCell<Option<io::Error>>>) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
            failure,
        }
    }
}

impl<R: BufRead> Iterator for SourceChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.pending.pop_front() {
                return Some(c);
            }
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => self.pending.extend(line.chars()),
                Err(error) => {
                    *self.failure.borrow_mut() = Some(error);
                    return None;
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input_path = args.next();
    if args.next().is_some() {
        bail!("Only one input file is supported");
    }

    let stdout = io::stdout().lock();
    let mut interpreter = Interpreter::new(stdout);

    if let Some(path) = input_path {
        let source = fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?;
        interpreter.run(source.chars())?;
    } else {
        let failure = Rc::new(RefCell::new(None));
        let source = SourceChars::new(io::stdin().lock(), Rc::clone(&failure));
        let outcome = interpreter.run(source);
        if let Some(error) = failure.borrow_mut().take() {
            return Err(error).context("Reading stdin");
        }
        outcome?;
    }

    Ok(())
}
