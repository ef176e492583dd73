use std::{
    fs::read_to_string,
    io::{stdin, stdout, BufRead, BufReader, Write},
    path::PathBuf,
};

mod ast_printer;
pub mod env;
mod expr;
pub mod interpreter;
mod parser;
mod scanner;
mod stmt;
mod token;
pub mod value;
mod visitor;

use anyhow::{Context, Result};
use log::debug;

pub use env::{Environment, UndefinedVariable};
pub use interpreter::Interpreter;
pub use value::RuntimeValue;

use crate::{ast_printer::AstPrinter, visitor::StmtVisitor};

/// An interpreter session. Definitions made by one call to [`Lox::run`] are
/// visible to the next, which is what the REPL relies on.
#[derive(Default)]
pub struct Lox {
    interpreter: Interpreter,
    dump_ast: bool,
}

impl Lox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each parsed statement before running it.
    pub fn dump_ast(mut self, dump_ast: bool) -> Self {
        self.dump_ast = dump_ast;
        self
    }

    pub fn globals(&self) -> &Environment {
        self.interpreter.globals()
    }

    pub fn run(&mut self, source: &str) -> Result<String> {
        let scanner = scanner::Scanner::new(source);
        let tokens = scanner.scan_tokens()?;

        let mut parser = parser::Parser::new(tokens);
        let stmts = parser.parse()?;
        debug!("parsed {} statements", stmts.len());

        if self.dump_ast {
            for stmt in &stmts {
                println!("{}", AstPrinter.visit_stmt(stmt));
            }
        }

        self.interpreter.interpret(&stmts)
    }

    pub fn run_file(&mut self, path: PathBuf) -> Result<String> {
        let contents =
            read_to_string(&path).with_context(|| format!("could not read file {:?}", &path))?;
        self.run(&contents)
    }

    /// Reads and runs lines until EOF. A failing line is reported and the
    /// session carries on; only I/O failures end the prompt early.
    pub fn run_prompt(&mut self) -> Result<()> {
        let mut reader = BufReader::new(stdin());
        loop {
            let mut buffer = String::new();
            print!("> ");
            stdout().flush().with_context(|| "could not flush stdout")?;
            reader.read_line(&mut buffer)?;
            if buffer.is_empty() {
                return Ok(());
            };
            if let Err(err) = self.run(&buffer) {
                eprintln!("Error: {:#}", err);
            }
        }
    }
}

pub fn run_file(path: PathBuf) -> Result<String> {
    Lox::new().run_file(path)
}

pub fn run_prompt() -> Result<()> {
    Lox::new().run_prompt()
}

pub fn run(source: &str) -> Result<String> {
    Lox::new().run(source)
}
