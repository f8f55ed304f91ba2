use std::io::Cursor;
use std::{env, fs, process};

use inkwell::context::Context;
use minic::codegen::Codegen;
use minic::err::FullMinicErr;
use minic::lexer::Lexer;
use minic::parser;

fn main() {
    let args: Vec<_> = env::args().collect();
    let (Some(fp), Some(out)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: codegen <source> <output.bc>");
        process::exit(2);
    };

    let code = match fs::read_to_string(fp) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{fp}: {e}");
            process::exit(1);
        }
    };

    let (program, funcs) = match parser::parse(Lexer::new(Cursor::new(code.as_str()))) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e.full_msg(&code));
            process::exit(1);
        }
    };

    let ctx = Context::create();
    let mut codegen = Codegen::new(&ctx, fp, &funcs);
    if let Err(e) = codegen.compile(&program) {
        eprintln!("{}", FullMinicErr::from(e).full_msg(&code));
        process::exit(1);
    }

    if !codegen.to_bc(out) {
        eprintln!("{out}: could not write bitcode");
        process::exit(1);
    }
}
