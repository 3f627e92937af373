mod cli_options;

use cli_options::{sys_error, CliOptions};
use rscc_compiler::compile;
use std::fs;
use std::io::{Read, Write};
use std::process;

fn main() {
    let options = CliOptions::parse();

    let source = match &options.file_path {
        Some(path) => fs::read_to_string(path).unwrap_or_else(|error| {
            sys_error(&format!("couldn't read {}: {}", path.display(), error), 1)
        }),
        None => {
            let mut source = String::new();
            if let Err(error) = std::io::stdin().read_to_string(&mut source) {
                sys_error(&format!("couldn't read stdin: {}", error), 1);
            }
            source
        }
    };

    match compile(&source, options.dump_ast) {
        Ok(assembly) => match &options.output_path {
            Some(path) => {
                if let Err(error) = fs::write(path, assembly) {
                    sys_error(&format!("couldn't write {}: {}", path.display(), error), 1);
                }
            }
            None => {
                let mut stdout = std::io::stdout();
                if let Err(error) = stdout.write_all(assembly.as_bytes()) {
                    sys_error(&format!("couldn't write stdout: {}", error), 1);
                }
            }
        },
        Err(error) => {
            error.print();
            process::exit(1);
        }
    }
}
