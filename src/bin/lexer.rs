use std::{env, fs, process};

use minic::lexer::tokenize;

fn main() {
    let args: Vec<_> = env::args().collect();
    let Some(fp) = args.get(1) else {
        eprintln!("usage: lexer <source>");
        process::exit(2);
    };

    let code = match fs::read_to_string(fp) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{fp}: {e}");
            process::exit(1);
        }
    };

    match tokenize(&code) {
        Ok(tokens) => {
            for tok in &tokens {
                println!("{} | {}", tok.type_name(), tok.kind);
            }
            println!("EOF | ");
        }
        Err(e) => {
            eprintln!("{}", e.full_msg(&code));
            process::exit(1);
        }
    }
}
