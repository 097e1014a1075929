use clap::{Parser as ClapParser, ValueEnum};
use kaleidoscope::backend::interp::InterpBackend;
use kaleidoscope::config::Options;
use kaleidoscope::lexer::Lexer;
use kaleidoscope::parser::Parser;
use kaleidoscope::toplevel::TopLevel;
use std::fs::File;
use std::io::{stdin, BufReader};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Built-in SSA interpreter
    Interp,
    /// LLVM with MCJIT (requires the `llvm` feature)
    Llvm,
}

#[derive(ClapParser, Debug)]
#[command(version, about = "Kaleidoscope REPL", long_about = None)]
struct Args {
    /// Read the program from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Code generation backend
    #[arg(short, long, value_enum, default_value_t = BackendKind::Interp)]
    backend: BackendKind,

    /// Skip optimisation of generated functions
    #[arg(long)]
    no_opt: bool,

    /// Nesting limit for calls while running compiled code
    #[arg(long, default_value_t = 1024)]
    max_call_depth: usize,

    /// Do not print generated IR
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), failure::Error> {
    env_logger::init();
    let args = Args::parse();

    let options = Options {
        optimize: !args.no_opt,
        max_call_depth: args.max_call_depth,
        dump_ir: !args.quiet,
    };

    let lexer = match &args.input {
        Some(path) => Lexer::new(BufReader::new(File::open(path)?)),
        None => Lexer::new(BufReader::new(stdin())),
    };

    match args.backend {
        BackendKind::Interp => {
            let backend = InterpBackend::new(&options);
            TopLevel::new(Parser::new(lexer), backend, options.dump_ir).main_loop();
        }
        BackendKind::Llvm => run_llvm(lexer, &options)?,
    }
    Ok(())
}

#[cfg(feature = "llvm")]
fn run_llvm(lexer: Lexer, options: &Options) -> Result<(), failure::Error> {
    let backend = kaleidoscope::backend::llvm::LlvmBackend::new(options)?;
    TopLevel::new(Parser::new(lexer), backend, options.dump_ir).main_loop();
    Ok(())
}

#[cfg(not(feature = "llvm"))]
fn run_llvm(_lexer: Lexer, _options: &Options) -> Result<(), failure::Error> {
    Err(failure::err_msg(
        "the llvm backend is disabled (compiled without the `llvm` feature)",
    ))
}
