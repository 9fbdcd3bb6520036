use std::path::PathBuf;
use std::process::{Command, ExitCode};

use clap::{CommandFactory, Parser as ClapParser, Subcommand, error::ErrorKind};
use colored::Colorize;
use mktemp::Temp;

use prosec::backend::CodeGenerator;
use prosec::frontend::ast::Program;
use prosec::frontend::lexer::{Lexer, TokenKind};
use prosec::frontend::SourceFile;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Compile a source file to LLVM IR
    Compile {
        source_file: PathBuf,

        /// Output path (defaults to the input with an `.ll` extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile and execute, calling every function with fixed test
    /// arguments and printing each result
    Run { source_file: PathBuf },

    /// Parse a source file and dump the AST
    Parse { source_file: PathBuf },

    /// Dump the token stream of a source file
    Tokens { source_file: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        CliCommand::Compile {
            source_file,
            output,
        } => compile(source_file, output),
        CliCommand::Run { source_file } => run(source_file),
        CliCommand::Parse { source_file } => parse(source_file),
        CliCommand::Tokens { source_file } => tokens(source_file),
    }
}

fn load_source(path: &PathBuf) -> SourceFile {
    if !path.exists() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Source file '{}' does not exist!", path.display()),
            )
            .exit()
    }

    if !path.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", path.display()),
            )
            .exit()
    }

    let contents =
        std::fs::read_to_string(path).expect("Failed to read input file (or invalid UTF-8)");

    SourceFile::from_file(path.clone(), contents)
}

fn report_error(error: impl core::fmt::Display) -> ExitCode {
    eprintln!("{} {error}", "error:".red().bold());
    ExitCode::FAILURE
}

fn compile(source_file: PathBuf, output: Option<PathBuf>) -> ExitCode {
    let source = load_source(&source_file);

    let ir = match prosec::compile_to_ir(&source) {
        Ok(ir) => ir,
        Err(error) => return report_error(error),
    };

    let output = output.unwrap_or_else(|| source_file.with_extension("ll"));

    if let Err(error) = std::fs::write(&output, ir) {
        return report_error(format_args!(
            "failed to write '{}': {error}",
            output.display()
        ));
    }

    println!("Compiled {} -> {}", source_file.display(), output.display());
    ExitCode::SUCCESS
}

fn run(source_file: PathBuf) -> ExitCode {
    let source = load_source(&source_file);

    let program = match prosec::parse(&source) {
        Ok(program) => program,
        Err(error) => return report_error(error),
    };

    let ir = match CodeGenerator::generate(&program) {
        Ok(ir) => ir,
        Err(error) => return report_error(error),
    };

    let scratch = match Temp::new_dir() {
        Ok(scratch) => scratch,
        Err(error) => return report_error(format_args!("failed to create scratch dir: {error}")),
    };

    let scratch_dir = scratch.to_path_buf();
    let ll_path = scratch_dir.join("program.ll");
    let binary_path = scratch_dir.join("program");

    let combined = format!("{ir}{}", test_harness(&program));

    if let Err(error) = std::fs::write(&ll_path, combined) {
        return report_error(format_args!("failed to write IR: {error}"));
    }

    let status = Command::new("clang")
        .arg("-w")
        .arg(&ll_path)
        .arg("-o")
        .arg(&binary_path)
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(_) => return report_error("clang failed to compile the generated IR"),
        Err(error) => return report_error(format_args!("failed to invoke clang: {error}")),
    }

    match Command::new(&binary_path).status() {
        Ok(status) => ExitCode::from(status.code().unwrap_or(1) as u8),
        Err(error) => report_error(format_args!("failed to run compiled program: {error}")),
    }
}

/// A synthetic `main` appended to the module IR: calls every compiled
/// function with the fixed test arguments (5, 3, 1, 1) and prints
/// `name = result` for each. The module preamble already declares
/// `printf`, so the harness only adds its own constants.
fn test_harness(program: &Program) -> String {
    let mut harness = String::from("\n; test harness entry point\n");

    harness.push_str("@.fmt_result = private constant [11 x i8] c\"%s = %.0f\\0A\\00\"\n");

    for (index, function) in program.function_definitions.iter().enumerate() {
        harness.push_str(&format!(
            "@.name{index} = private constant [{} x i8] c\"{}\\00\"\n",
            function.name.len() + 1,
            function.name
        ));
    }

    harness.push_str("\ndefine i32 @main() {\nentry:\n");

    for (index, function) in program.function_definitions.iter().enumerate() {
        let arguments = (0..function.parameters.len())
            .map(|position| match position {
                0 => "double 5.0",
                1 => "double 3.0",
                _ => "double 1.0",
            })
            .collect::<Vec<_>>()
            .join(", ");

        let name_length = function.name.len() + 1;

        harness.push_str(&format!(
            "  %r{index} = call double @{}({arguments})\n",
            function.name
        ));
        harness.push_str(&format!(
            "  %fmt{index} = getelementptr [11 x i8], [11 x i8]* @.fmt_result, i32 0, i32 0\n"
        ));
        harness.push_str(&format!(
            "  %nm{index} = getelementptr [{name_length} x i8], [{name_length} x i8]* @.name{index}, i32 0, i32 0\n"
        ));
        harness.push_str(&format!(
            "  call i32 (i8*, ...) @printf(i8* %fmt{index}, i8* %nm{index}, double %r{index})\n"
        ));
    }

    harness.push_str("  ret i32 0\n}\n");
    harness
}

fn parse(source_file: PathBuf) -> ExitCode {
    let source = load_source(&source_file);

    match prosec::parse(&source) {
        Ok(program) => {
            println!("{program:#?}");
            ExitCode::SUCCESS
        }
        Err(error) => report_error(error),
    }
}

fn tokens(source_file: PathBuf) -> ExitCode {
    let source = load_source(&source_file);

    let tokens = match Lexer::new(&source).tokenize() {
        Ok(tokens) => tokens,
        Err(error) => return report_error(error),
    };

    for token in tokens {
        if matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
            continue;
        }

        print!("{:?}({}) ", token.kind, source.value_of_span(token.span));
    }

    println!();
    ExitCode::SUCCESS
}
