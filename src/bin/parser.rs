use std::io::Cursor;
use std::{env, fs, process};

use minic::lexer::Lexer;
use minic::parser;

fn main() {
    let args: Vec<_> = env::args().collect();
    let Some(fp) = args.get(1) else {
        eprintln!("usage: parser <source>");
        process::exit(2);
    };

    let code = match fs::read_to_string(fp) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{fp}: {e}");
            process::exit(1);
        }
    };

    match parser::parse(Lexer::new(Cursor::new(code.as_str()))) {
        Ok((program, _)) => print!("{program}"),
        Err(e) => {
            eprintln!("{}", e.full_msg(&code));
            process::exit(1);
        }
    }
}
