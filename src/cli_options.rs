use std::path::PathBuf;
use std::process;

const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

const USAGE: &str = "\
usage: rscc [-o | --output <file>] [--dump-ast] [-h | --help] [-v | --version] [<file>]";

const HELP: &str = "usage: rscc [options] [<file>]
options:
    -o | --output <file>    Specifies the output-file to write to, instead of stdout
         --dump-ast         Displays the tree of every function definition on stderr
    -h | --help             Prints usage information
    -v | --version          Prints version information

file:
    The Simple C source file to be read; standard input when omitted";

fn sys_info(msg: &str) -> ! {
    eprintln!("{msg}");
    process::exit(0);
}

pub fn sys_error(msg: &str, exit_code: i32) -> ! {
    eprintln!("rscc: {msg}");
    process::exit(exit_code);
}

pub struct CliOptions {
    // source file to compile; stdin when absent
    pub file_path: Option<PathBuf>,

    // output file to write to; stdout when absent
    pub output_path: Option<PathBuf>,

    // displays the tree of every function definition
    pub dump_ast: bool,
}

impl CliOptions {
    pub fn parse() -> CliOptions {
        let mut options = CliOptions {
            file_path: None,
            output_path: None,
            dump_ast: false,
        };

        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            if arg.starts_with('-') {
                match arg.as_str() {
                    "-o" | "--output" => match args.next() {
                        Some(file) => options.output_path = Some(PathBuf::from(file)),
                        None => sys_error(&format!("expects file following '{}' option", arg), 2),
                    },
                    "--dump-ast" => options.dump_ast = true,
                    "-h" | "--help" => sys_info(HELP),
                    "-v" | "--version" => sys_info(VERSION),
                    _ => sys_error(&format!("illegal option '{}'\n{}", arg, USAGE), 2),
                }
            } else if options.file_path.is_none() {
                options.file_path = Some(PathBuf::from(arg));
            } else {
                sys_error(USAGE, 2);
            }
        }

        options
    }
}
