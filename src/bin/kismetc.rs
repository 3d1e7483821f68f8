// kismetc - Kismet bytecode compiler
// Compiles a parsed script unit against a package's object table and prints the
// resulting bytecode listing

use std::env;
use std::fs;
use std::process;

use kismetc::kismet_compiler::ast::CompilationUnit;
use kismetc::kismet_compiler::{CompilerOptions, KismetCompiler, ObjectTable, Package};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut input_file = "";
    let mut package_file = "";
    let mut config_file = "";
    let mut output_file = "";
    let mut lenient = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--package" | "-c" | "--config" | "-o" | "--output" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: {} requires a filename", args[i]);
                    process::exit(1);
                }
                let value = args[i + 1].as_str();
                match args[i].as_str() {
                    "-p" | "--package" => package_file = value,
                    "-c" | "--config" => config_file = value,
                    _ => output_file = value,
                }
                i += 2;
            }
            "--lenient" => {
                lenient = true;
                i += 1;
            }
            "-v" | "--verbose" => {
                verbose = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option '{}'", arg);
                print_usage(&args[0]);
                process::exit(1);
            }
            _ => {
                if input_file.is_empty() {
                    input_file = &args[i];
                } else {
                    eprintln!("Error: Multiple input files specified");
                    process::exit(1);
                }
                i += 1;
            }
        }
    }

    // Initialize logging; RUST_LOG still wins when set
    let mut logger = env_logger::Builder::from_default_env();
    if verbose && env::var_os("RUST_LOG").is_none() {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if input_file.is_empty() {
        eprintln!("Error: No input file specified");
        print_usage(&args[0]);
        process::exit(1);
    }
    if package_file.is_empty() {
        eprintln!("Error: --package is required");
        process::exit(1);
    }

    let mut options = if config_file.is_empty() {
        CompilerOptions::default()
    } else {
        CompilerOptions::load(config_file).unwrap_or_else(|err| {
            eprintln!("Error reading '{}': {}", config_file, err);
            process::exit(1);
        })
    };
    if lenient {
        options.strict = false;
    }

    let unit = CompilationUnit::load(input_file).unwrap_or_else(|err| {
        eprintln!("Error reading '{}': {}", input_file, err);
        process::exit(1);
    });
    let mut package = Package::load(package_file).unwrap_or_else(|err| {
        eprintln!("Error reading '{}': {}", package_file, err);
        process::exit(1);
    });
    let (imports_before, exports_before) = (package.imports().len(), package.exports().len());

    if verbose {
        println!(
            "Compiling {} against {} ({} imports, {} exports)",
            input_file, package.name, imports_before, exports_before
        );
    }

    let compiler = KismetCompiler::new(options);
    match compiler.compile(&unit, &mut package) {
        Ok(script) => {
            let listing = script.to_string();
            if output_file.is_empty() {
                print!("{}", listing);
            } else if let Err(err) = fs::write(output_file, &listing) {
                eprintln!("Error writing '{}': {}", output_file, err);
                process::exit(1);
            }

            if verbose {
                println!(
                    "Compiled {} functions; object table gained {} imports, {} exports",
                    script.all_functions().count(),
                    package.imports().len() - imports_before,
                    package.exports().len() - exports_before
                );
            }
        }
        Err(err) => {
            eprintln!("Compilation error: {}", err);
            process::exit(1);
        }
    }
}

fn print_usage(program_name: &str) {
    println!("Usage: {} [options] --package <package.toml> <unit.toml>", program_name);
    println!();
    println!("Options:");
    println!("  -p, --package <file>   Object table the unit is compiled against");
    println!("  -c, --config <file>    Compiler options (TOML)");
    println!("  -o, --output <file>    Write the listing to a file instead of stdout");
    println!("  --lenient              Guess the owner of members on unknown objects");
    println!("  -v, --verbose          Verbose output and debug logging");
    println!("  -h, --help             Show this help message");
    println!();
    println!("Examples:");
    println!(
        "  {} -p Door.package.toml Door.unit.toml",
        program_name
    );
    println!(
        "  {} -p Door.package.toml -c kismetc.toml -o Door.txt Door.unit.toml",
        program_name
    );
}
