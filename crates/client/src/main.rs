//! A curl-flavored command line front end over the client library.
//!
//! Exit codes: 0 for a 2xx/3xx response, 1 for transport or protocol
//! failures (and non-success statuses), 2 for usage errors.

use std::io::Write;
use std::process::ExitCode;

use strand::{Body, Client, Request};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const USAGE: &str = "usage: strand [options] URL
options:
  -X, --method METHOD     HTTP method (default GET)
  -H, --header 'K: V'     add a request header (repeatable)
  -d, --data DATA         request body
  -A, --user-agent UA     set the User-Agent header
  -o, --output FILE       append the response body to FILE
  -i, --include           print response headers before the body
  -v, --verbose           print request headers and enable debug logging";

struct Args {
    url: String,
    method: String,
    headers: Vec<(String, String)>,
    data: Option<String>,
    user_agent: Option<String>,
    output: Option<String>,
    include: bool,
    verbose: bool,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut args = Args {
        url: String::new(),
        method: "GET".to_string(),
        headers: Vec::new(),
        data: None,
        user_agent: None,
        output: None,
        include: false,
        verbose: false,
    };

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "-X" | "--method" => {
                args.method = raw.next().ok_or("missing value for -X")?.to_uppercase();
            }
            "-H" | "--header" => {
                let header = raw.next().ok_or("missing value for -H")?;
                let (name, value) =
                    header.split_once(':').ok_or("headers take the form 'Name: value'")?;
                args.headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            "-d" | "--data" => args.data = Some(raw.next().ok_or("missing value for -d")?),
            "-A" | "--user-agent" => {
                args.user_agent = Some(raw.next().ok_or("missing value for -A")?)
            }
            "-o" | "--output" => args.output = Some(raw.next().ok_or("missing value for -o")?),
            "-i" | "--include" => args.include = true,
            "-v" | "--verbose" => args.verbose = true,
            "-h" | "--help" => return Err(String::new()),
            other if other.starts_with('-') => return Err(format!("unknown option `{other}`")),
            url if args.url.is_empty() => args.url = url.to_string(),
            _ => return Err("only one URL is accepted".to_string()),
        }
    }

    if args.url.is_empty() {
        return Err("a URL is required".to_string());
    }
    Ok(args)
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("strand: {message}");
            }
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    if args.verbose {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("strand: cannot start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Args) -> ExitCode {
    let method = match args.method.parse::<http::Method>() {
        Ok(method) => method,
        Err(_) => {
            eprintln!("strand: invalid method `{}`", args.method);
            return ExitCode::from(2);
        }
    };

    let client = Client::builder().persistent_connections(false).build();
    let mut request = match Request::new(method, &args.url) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("strand: {e}");
            return ExitCode::from(2);
        }
    };

    for (name, value) in &args.headers {
        let parsed = name
            .parse::<http::header::HeaderName>()
            .ok()
            .zip(value.parse::<http::HeaderValue>().ok());
        match parsed {
            Some((name, value)) => {
                request.headers.append(name, value);
            }
            None => {
                eprintln!("strand: invalid header `{name}`");
                return ExitCode::from(2);
            }
        }
    }

    if let Some(data) = args.data {
        if !request.headers.contains_key(http::header::CONTENT_TYPE) {
            request.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        }
        request.body = Body::from(data);
    }
    if let Some(user_agent) = args.user_agent {
        match user_agent.parse::<http::HeaderValue>() {
            Ok(value) => {
                request.headers.insert(http::header::USER_AGENT, value);
            }
            Err(_) => {
                eprintln!("strand: invalid user agent");
                return ExitCode::from(2);
            }
        }
    }

    if args.verbose {
        eprintln!("> {} {}", request.method, request.uri.request_target());
        for (name, value) in request.headers.iter() {
            eprintln!("> {}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
    }

    let response = match client.send(request).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("strand: {e}");
            return ExitCode::from(1);
        }
    };

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => {
            match std::fs::OpenOptions::new().append(true).create(true).open(path) {
                Ok(file) => Box::new(file),
                Err(e) => {
                    eprintln!("strand: cannot open {path}: {e}");
                    return ExitCode::from(1);
                }
            }
        }
        None => Box::new(std::io::stdout()),
    };

    if args.include {
        let _ = writeln!(out, "HTTP/1.1 {} {}", response.status().as_u16(), response.reason());
        for (name, value) in response.headers().iter() {
            let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        let _ = writeln!(out);
    }
    let _ = out.write_all(response.content());
    let _ = out.flush();

    if response.status().is_success() || response.status().is_redirection() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
