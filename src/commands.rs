//! Command execution.

use crate::Commands;
use colored::Colorize;
use gwire_protocol::tokens::{ARGS_BATCH_SIZE, ARGS_EVAL_TIMEOUT, ARGS_G};
use gwire_protocol::{
    negotiate_header, Codecs, MessageSerializer, RequestMessage, ResponseMessage, ResponseStatus,
    TypedValue, Value,
};
use gwire_server::Config;
use std::path::Path;

type CmdResult = Result<String, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub fn execute(cmd: Commands) -> CmdResult {
    let codecs = Codecs::global();
    match cmd {
        Commands::Header { mime } => {
            let header = negotiate_header(&mime)?;
            Ok(format!(
                "{} {} ({} bytes)",
                hex::encode(header).cyan(),
                codecs.negotiate(&mime)?.mime_type().yellow(),
                header.len()
            ))
        }

        Commands::Encode {
            script,
            mime,
            id,
            bindings,
            alias,
            timeout,
            batch_size,
        } => {
            let mut request = RequestMessage::eval(script);
            if let Some(id) = id {
                request = request.with_id(id);
            }
            for binding in &bindings {
                let (name, value) = parse_binding(binding)?;
                request = request.with_binding(name, value)?;
            }
            if let Some(alias) = alias {
                request = request.with_arg(ARGS_G, TypedValue::string(alias));
            }
            if let Some(timeout) = timeout {
                request = request.with_arg(ARGS_EVAL_TIMEOUT, TypedValue::long(timeout));
            }
            if let Some(batch_size) = batch_size {
                request = request.with_arg(ARGS_BATCH_SIZE, TypedValue::integer(batch_size));
            }
            let bytes = codecs.encode_request(&request, &mime)?;
            Ok(hex::encode(bytes))
        }

        Commands::Decode {
            input,
            mime,
            response,
        } => {
            let data = read_input(&input)?;
            let codec = pick_codec(codecs, &data, mime.as_deref())?;
            if response {
                Ok(format_response(&codec.deserialize_response(&data)?))
            } else {
                Ok(format_request(&codec.deserialize_request(&data)?))
            }
        }

        Commands::Transcode {
            input,
            to,
            response,
        } => {
            let data = read_input(&input)?;
            let from = codecs.detect(&data)?;
            let target = codecs.negotiate(&to)?;
            let bytes = if response {
                target.serialize_response(&from.deserialize_response(&data)?)?
            } else {
                target.serialize_request(&from.deserialize_request(&data)?)?
            };
            tracing::debug!(
                "Transcoded {} bytes of {} into {} bytes of {}",
                data.len(),
                from.mime_type(),
                bytes.len(),
                target.mime_type()
            );
            Ok(hex::encode(bytes))
        }

        Commands::CheckConfig { path } => {
            let config = match &path {
                Some(path) => Config::from_file(path)?,
                None => Config::from_env(),
            };
            config.validate()?;
            Ok(format_config(&config, path.as_deref()))
        }
    }
}

/// Parses `name=JSON`; values that are not valid JSON are taken as strings.
fn parse_binding(arg: &str) -> Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("binding '{}' must look like name=value", arg))?;
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from(json),
        Err(_) => Value::String(raw.to_string()),
    };
    Ok((name.to_string(), value))
}

/// Reads hex from the argument, or raw bytes from `@path`.
fn read_input(input: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if let Some(path) = input.strip_prefix('@') {
        return Ok(std::fs::read(path)?);
    }
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(cleaned)?)
}

fn pick_codec<'a>(
    codecs: &'a Codecs,
    data: &[u8],
    mime: Option<&str>,
) -> Result<&'a dyn MessageSerializer, gwire_protocol::ProtocolError> {
    match mime {
        Some(mime) => codecs.negotiate(mime),
        None => codecs.detect(data),
    }
}

fn format_request(request: &RequestMessage) -> String {
    let mut output = format!(
        "{} {}\n",
        "Request".bold(),
        request.request_id.cyan()
    );
    output.push_str(&format!("  op:          {}\n", request.op.yellow()));
    output.push_str(&format!("  gremlinType: {}\n", request.gremlin_type.yellow()));
    for (key, value) in &request.args {
        output.push_str(&format!("  {:<12} {} ({})\n", format!("{}:", key), value, value.tag()));
    }
    output.trim_end().to_string()
}

fn format_response(response: &ResponseMessage) -> String {
    let id = response.request_id().unwrap_or("-");
    let mut output = format!("{} {}\n", "Response".bold(), id.cyan());
    match response.status() {
        ResponseStatus::Success(code) => {
            output.push_str(&format!(
                "  status: {} {}\n",
                code.get().as_u16().to_string().green(),
                code
            ));
        }
        ResponseStatus::Error(record) => {
            output.push_str(&format!(
                "  status: {} {} [{}]\n",
                record.code().as_u16().to_string().red(),
                record.code(),
                record.kind()
            ));
            output.push_str(&format!("  message: {}\n", record.message()));
        }
    }
    for (key, value) in response.meta() {
        output.push_str(&format!("  meta {}: {}\n", key, value));
    }
    match response.result() {
        Some(results) => {
            for (i, value) in results.iter().enumerate() {
                output.push_str(&format!("  [{}] {} ({})\n", i, value, value.tag()));
            }
        }
        None => output.push_str(&format!("  {}\n", "no result".dimmed())),
    }
    output.trim_end().to_string()
}

fn format_config(config: &Config, path: Option<&Path>) -> String {
    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let limits = &config.limits;
    let mut output = format!("{} {}\n", "Configuration OK".green(), source.dimmed());
    output.push_str(&format!("  max_bindings:        {}\n", limits.max_bindings));
    output.push_str(&format!("  max_content_length:  {}\n", limits.max_content_length));
    output.push_str(&format!("  max_request_size:    {}\n", limits.max_request_size));
    output.push_str(&format!(
        "  evaluation_timeout:  {}\n",
        match limits.evaluation_timeout() {
            Some(timeout) => format!("{:?}", timeout),
            None => "unlimited".to_string(),
        }
    ));
    output.push_str(&format!("  results_per_batch:   {}\n", limits.results_per_batch));
    output.push_str(&format!("  allow_lambdas:       {}\n", limits.allow_lambdas));
    output.push_str(&format!(
        "  serializers:         {} (default {})\n",
        config.serializers.mime_types.join(", "),
        config.serializers.default_mime_type.yellow()
    ));
    for (alias, name) in &config.sources.0 {
        output.push_str(&format!("  source {} -> {}\n", alias.cyan(), name));
    }
    output.trim_end().to_string()
}
