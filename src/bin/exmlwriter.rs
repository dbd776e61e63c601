//! Parse XML files and write them back through the streaming writer.
//!
//! The command line follows `xmllint`: every file is parsed into a tree,
//! then replayed through `XmlTextWriter` with the requested output settings.

use std::{
    fs,
    io::{Read, stdin, stdout},
    process::exit,
    sync::{LazyLock, Mutex},
    time::Instant,
};

use anyhow::{Context, bail};
use clap::Parser;
use exml_writer::{XmlTextWriter, encoding::find_encoding_handler, tree::Document};

// Error codes.
// These are similar to `xmllintReturnCode` in original xmllint.
const RETURN_OK: i32 = 0; // No error
const ERR_RDFILE: i32 = 4; // Error reading or parsing an input
const ERR_OUT: i32 = 6; // Error writing output

static TIMER: Mutex<Option<Instant>> = Mutex::new(None);

// start_timer: call where you want to start timing
fn start_timer() {
    if let Ok(mut timer) = TIMER.lock() {
        *timer = Some(Instant::now());
    }
}

// end_timer: call where you want to stop timing and to print out a
//            message about the timing performed
macro_rules! end_timer {
    ( $fmt:literal, $( $args:expr ),* ) => {
        if let Some(timer) = TIMER.lock().ok().and_then(|timer| *timer) {
            eprint!($fmt, $( $args ),*);
            eprintln!(" took {} ms", timer.elapsed().as_millis());
        }
    };
    ( $fmt:literal ) => {
        end_timer!($fmt, );
    }
}

#[derive(clap::Parser, Debug)]
#[command(
    version,
    name = "exmlwriter",
    about = "Parse the XML files and write them again with the streaming writer.",
    arg_required_else_help = true
)]
struct CmdArgs {
    /// the files to rewrite, `-` for the standard input
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// save to a given file, `-` for the standard output
    #[arg(short, long, value_name = "file", default_value = "-")]
    output: String,
    /// reformat/reindent the output
    #[arg(long)]
    format: bool,
    /// the string used for one level of indentation, implies --format
    #[arg(long, value_name = "string")]
    indent_string: Option<String>,
    /// the character quoting attribute values, `"` or `'`
    #[arg(long, value_name = "char", default_value_t = '"')]
    quote_char: char,
    /// output in the given encoding
    #[arg(long, value_name = "encoding")]
    encode: Option<String>,
    /// override the standalone declaration
    #[arg(long, value_name = "yes|no")]
    standalone: Option<String>,
    /// drop ignorable blank spaces
    #[arg(long)]
    noblanks: bool,
    /// remove the DOCTYPE of the input documents
    #[arg(long)]
    dropdtd: bool,
    /// print some timings
    #[arg(long)]
    timing: bool,
}

static CMD_ARGS: LazyLock<CmdArgs> = LazyLock::new(|| {
    let mut cmd_args = CmdArgs::parse();
    if cmd_args.indent_string.is_some() {
        cmd_args.format = true;
    }
    cmd_args
});

fn read_input(filename: &str) -> anyhow::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = vec![];
        stdin()
            .read_to_end(&mut buf)
            .context("failed to read the standard input")?;
        Ok(buf)
    } else {
        fs::read(filename).with_context(|| format!("failed to read {filename}"))
    }
}

fn parse_document(filename: &str) -> anyhow::Result<Document> {
    let input = read_input(filename)?;
    if CMD_ARGS.timing {
        start_timer();
    }
    let mut doc = Document::parse_with(&input, !CMD_ARGS.noblanks)
        .with_context(|| format!("{filename} : failed to parse"))?;
    if CMD_ARGS.timing {
        end_timer!("Parsing");
    }

    if CMD_ARGS.dropdtd {
        doc.doctype = None;
    }
    if let Some(encoding) = CMD_ARGS.encode.as_deref() {
        doc.version.get_or_insert_with(|| "1.0".to_owned());
        doc.encoding = Some(encoding.to_owned());
    }
    match CMD_ARGS.standalone.as_deref() {
        Some("yes") => doc.standalone = Some(true),
        Some("no") => doc.standalone = Some(false),
        Some(other) => bail!("--standalone accepts only 'yes' or 'no', not '{other}'"),
        None => {}
    }
    Ok(doc)
}

fn write_document(doc: &Document) -> anyhow::Result<()> {
    if CMD_ARGS.timing {
        start_timer();
    }
    let mut writer = if CMD_ARGS.output == "-" {
        XmlTextWriter::from_writer(stdout())
    } else {
        XmlTextWriter::from_filename(&CMD_ARGS.output)
            .with_context(|| format!("failed to open {}", CMD_ARGS.output))?
    };
    if CMD_ARGS.format {
        writer.set_indent(true);
        if let Some(indent) = CMD_ARGS.indent_string.as_deref() {
            writer.set_indent_string(indent);
        }
    }
    let quote = u8::try_from(CMD_ARGS.quote_char).context("the quote character must be ASCII")?;
    writer.set_quote_char(quote)?;

    doc.write_to(&mut writer).context("failed to write the document")?;
    writer.flush()?;
    if CMD_ARGS.timing {
        end_timer!("Saving");
    }
    Ok(())
}

fn main() {
    if let Some(encoding) = CMD_ARGS.encode.as_deref() {
        if find_encoding_handler(encoding).is_none() {
            eprintln!("Unsupported encoding {encoding}");
            exit(ERR_OUT);
        }
    }

    let mut result = RETURN_OK;
    for filename in &CMD_ARGS.xml_files {
        let doc = match parse_document(filename) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("{e:#}");
                result = result.max(ERR_RDFILE);
                continue;
            }
        };
        if let Err(e) = write_document(&doc) {
            eprintln!("{e:#}");
            result = result.max(ERR_OUT);
        }
    }
    exit(result);
}
