//! Verb table and request dispatch

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, warn};

use super::context::ServerContext;
use crate::json::{self, JsonValue};
use crate::protocol::{Request, Response};
use crate::{RtdocError, RtdocResult};

type Handler = fn(&ServerContext, &[&str]) -> Response;

/// One entry of the dispatch table
pub struct Command {
    pub name: &'static str,
    /// Number of arguments; the last one takes the rest of the line
    pub arity: usize,
    handler: Handler,
}

/// Every verb the server understands, fixed at compile time
pub static COMMANDS: &[Command] = &[
    Command { name: "ping", arity: 0, handler: ping },
    Command { name: "add", arity: 2, handler: add },
    Command { name: "get", arity: 1, handler: get },
    Command { name: "remove", arity: 1, handler: remove },
    Command { name: "start", arity: 2, handler: start },
    Command { name: "end", arity: 2, handler: end },
    Command { name: "update", arity: 3, handler: edit },
    Command { name: "modify", arity: 3, handler: edit },
    Command { name: "exists", arity: 1, handler: exists },
    Command { name: "keys", arity: 0, handler: keys },
    Command { name: "size", arity: 0, handler: size },
    Command { name: "commands", arity: 0, handler: commands },
    Command { name: "client-list", arity: 0, handler: client_list },
    Command { name: "client-kill", arity: 2, handler: client_kill },
    Command { name: "pause", arity: 1, handler: pause },
    Command { name: "save", arity: 0, handler: save },
];

/// Look up a verb by exact name
pub fn find(verb: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|command| command.name == verb)
}

/// Execute one request line against the server state
///
/// Returns `None` for a blank line, which gets no response.
pub fn dispatch(ctx: &ServerContext, line: &str) -> Option<Response> {
    let request = Request::parse(line)?;

    let response = match resolve(&request) {
        Ok((command, args)) => {
            debug!("Executing {} {:?}", command.name, args);
            (command.handler)(ctx, &args)
        }
        Err(RtdocError::InvalidCommand { verb }) => Response::InvalidCommand(verb),
        Err(RtdocError::WrongArity { verb, expected }) => {
            debug!("'{}' expects {} arguments", verb, expected);
            Response::WrongArity(verb)
        }
        Err(e) => {
            warn!("Unexpected dispatch error: {}", e);
            Response::Nil
        }
    };
    Some(response)
}

fn resolve<'a>(request: &Request<'a>) -> RtdocResult<(&'static Command, Vec<&'a str>)> {
    let command = find(request.verb).ok_or_else(|| RtdocError::InvalidCommand {
        verb: request.verb.to_string(),
    })?;
    let args = request
        .args(command.arity)
        .ok_or_else(|| RtdocError::WrongArity {
            verb: command.name.to_string(),
            expected: command.arity,
        })?;
    Ok((command, args))
}

/// Map a store result onto `ok`/`nil`
fn ok_or_nil<T>(result: RtdocResult<T>) -> Response {
    match result {
        Ok(_) => Response::Ok,
        Err(e) if e.is_recoverable() => {
            debug!("{}", e);
            Response::Nil
        }
        Err(e) => {
            warn!("{}", e);
            Response::Nil
        }
    }
}

fn json_array<I, S>(items: I) -> Response
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let array = JsonValue::array(items.into_iter().map(JsonValue::string));
    Response::Json(json::stringify(&array))
}

fn ping(_: &ServerContext, _: &[&str]) -> Response {
    Response::Pong
}

fn add(ctx: &ServerContext, args: &[&str]) -> Response {
    let contents = json::parse(args[1]);
    ok_or_nil(contents.and_then(|contents| ctx.store().put(args[0], contents)))
}

fn get(ctx: &ServerContext, args: &[&str]) -> Response {
    ctx.store()
        .stringify(args[0])
        .map_or(Response::Nil, Response::Json)
}

fn remove(ctx: &ServerContext, args: &[&str]) -> Response {
    ctx.store().remove(args[0]);
    Response::Ok
}

fn start(ctx: &ServerContext, args: &[&str]) -> Response {
    ok_or_nil(ctx.store().add_collaborator(args[0], args[1]))
}

fn end(ctx: &ServerContext, args: &[&str]) -> Response {
    match ctx.store().remove_collaborator(args[0], args[1]) {
        // Ending a session that was never started is not an error
        Err(RtdocError::CollaboratorNotFound { key, user_id }) => {
            debug!("No session for {} on {}", user_id, key);
            Response::Ok
        }
        result => ok_or_nil(result),
    }
}

/// Edits are accepted but not applied
fn edit(_: &ServerContext, args: &[&str]) -> Response {
    debug!("Ignoring edit to {} from {}: {}", args[0], args[1], args[2]);
    Response::Ok
}

fn exists(ctx: &ServerContext, args: &[&str]) -> Response {
    Response::Bool(ctx.store().contains(args[0]))
}

fn keys(ctx: &ServerContext, _: &[&str]) -> Response {
    let mut keys = ctx.store().keys();
    keys.sort_unstable();
    json_array(keys)
}

fn size(ctx: &ServerContext, _: &[&str]) -> Response {
    Response::Count(ctx.store().len())
}

fn commands(_: &ServerContext, _: &[&str]) -> Response {
    json_array(COMMANDS.iter().map(|command| command.name))
}

fn client_list(ctx: &ServerContext, _: &[&str]) -> Response {
    json_array(ctx.clients().peers().iter().map(SocketAddr::to_string))
}

fn client_kill(ctx: &ServerContext, args: &[&str]) -> Response {
    let (Ok(ip), Ok(port)) = (args[0].parse::<IpAddr>(), args[1].parse::<u16>()) else {
        return Response::Nil;
    };
    if ctx.clients().kill(SocketAddr::new(ip, port)) {
        Response::Ok
    } else {
        Response::Nil
    }
}

fn pause(ctx: &ServerContext, args: &[&str]) -> Response {
    match args[0].parse::<u64>() {
        Ok(millis) => {
            ctx.pause(Duration::from_millis(millis));
            Response::Ok
        }
        Err(_) => Response::Nil,
    }
}

fn save(_: &ServerContext, _: &[&str]) -> Response {
    Response::NotImplemented
}
