//! Executes a parsed [`Tree`] against a data value.
//!
//! Field lookups are strict: a key missing from a map fails the render
//! instead of printing a placeholder. Output is capped at
//! [`MAX_OUTPUT_LEN`](super::MAX_OUTPUT_LEN) bytes.

use std::borrow::Cow;
use std::fmt;

use crate::error::ExecError;

use super::funcs::Funcs;
use super::node::{Arg, Branch, Command, Node, Pipeline, Tree};
use super::value::Value;
use super::MAX_OUTPUT_LEN;

/// Deepest chain of `{{template}}` calls.
const MAX_TEMPLATE_DEPTH: usize = 200;

pub(crate) fn execute(tree: &Tree, funcs: &Funcs, data: Value) -> Result<String, ExecError> {
    let mut state = State {
        tree,
        funcs,
        vars: vec![("$".to_string(), data.clone())],
        depth: 0,
        line: 1,
        out: String::new(),
    };
    state.walk_list(&data, &tree.root)?;
    Ok(state.out)
}

/// What a node list asks its enclosing `range` to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
    Continue,
}

struct State<'a> {
    tree: &'a Tree,
    funcs: &'a Funcs,
    /// Variables in scope, innermost last.
    vars: Vec<(String, Value)>,
    depth: usize,
    line: usize,
    out: String,
}

impl<'a> State<'a> {
    fn walk_list(&mut self, dot: &Value, nodes: &[Node]) -> Result<Flow, ExecError> {
        for node in nodes {
            match self.walk(dot, node)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn walk(&mut self, dot: &Value, node: &Node) -> Result<Flow, ExecError> {
        match node {
            Node::Text(text) => self.write(text)?,
            Node::Action(pipe) => {
                let value = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    match value {
                        Value::Nil => self.write("<no value>")?,
                        value => self.write(&value.to_string())?,
                    }
                }
            }
            Node::If(branch) => return self.walk_if(dot, branch, false),
            Node::With(branch) => return self.walk_if(dot, branch, true),
            Node::Range(branch) => self.walk_range(dot, branch)?,
            Node::Template { line, name, pipe } => {
                self.line = *line;
                self.walk_template(dot, name, pipe.as_ref())?;
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Next)
    }

    /// `if`, or `with` when `rebind` is set.
    fn walk_if(&mut self, dot: &Value, branch: &Branch, rebind: bool) -> Result<Flow, ExecError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let flow = if value.is_true() {
            let dot = if rebind { &value } else { dot };
            self.walk_list(dot, &branch.list)
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(dot, else_list)
        } else {
            Ok(Flow::Next)
        };
        self.vars.truncate(mark);
        flow
    }

    fn walk_range(&mut self, dot: &Value, branch: &Branch) -> Result<(), ExecError> {
        let mark = self.vars.len();
        let pipe = &branch.pipe;
        let value = self.eval_commands(dot, pipe)?;

        let items: Vec<(Value, Value)> = match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Bytes(bytes) => bytes
                .into_iter()
                .enumerate()
                .map(|(i, b)| (Value::from(i), Value::Int(i64::from(b))))
                .collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Nil => Vec::new(),
            other => {
                return Err(self.error(format!("range can't iterate over {other}")));
            }
        };

        if items.is_empty() {
            if let Some(else_list) = &branch.else_list {
                self.walk_list(dot, else_list)?;
            }
            return Ok(());
        }

        for (key, item) in items {
            self.vars.truncate(mark);
            match pipe.decl.as_slice() {
                [elem] => self.bind(elem, item.clone(), pipe.is_assign),
                [index, elem] => {
                    self.bind(index, key, pipe.is_assign);
                    self.bind(elem, item.clone(), pipe.is_assign);
                }
                _ => {}
            }
            if self.walk_list(&item, &branch.list)? == Flow::Break {
                break;
            }
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn walk_template(
        &mut self,
        dot: &Value,
        name: &str,
        pipe: Option<&Pipeline>,
    ) -> Result<(), ExecError> {
        let tree = self.tree;
        let body = tree
            .defines
            .get(name)
            .ok_or_else(|| self.error(format!("no such template {name:?}")))?;
        let data = match pipe {
            Some(pipe) => self.eval_pipeline(dot, pipe)?,
            None => Value::Nil,
        };
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(self.error(format!(
                "exceeded maximum template depth ({MAX_TEMPLATE_DEPTH})"
            )));
        }

        let vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        self.depth += 1;
        let result = self.walk_list(&data, body);
        self.depth -= 1;
        self.vars = vars;
        result.map(|_| ())
    }

    fn write(&mut self, text: &str) -> Result<(), ExecError> {
        if self.out.len() + text.len() > MAX_OUTPUT_LEN {
            return Err(self.error(format!(
                "rendered output exceeds {MAX_OUTPUT_LEN} bytes"
            )));
        }
        self.out.push_str(text);
        Ok(())
    }

    /// Evaluates the pipeline and binds its variable, if it declares one.
    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, ExecError> {
        let value = self.eval_commands(dot, pipe)?;
        if let Some(name) = pipe.decl.first() {
            self.bind(name, value.clone(), pipe.is_assign);
        }
        Ok(value)
    }

    /// Runs each command, passing the previous result as the last argument.
    fn eval_commands(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value, ExecError> {
        self.line = pipe.line;
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value)?);
        }
        Ok(value.unwrap_or(Value::Nil))
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &Command,
        last: Option<Value>,
    ) -> Result<Value, ExecError> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Err(self.error("empty command"));
        };
        match first {
            Arg::Field(path) => self.eval_field_chain(dot, dot, first, path, rest, last),
            Arg::Chain(inner, path) => {
                let receiver = self.eval_arg(dot, inner)?;
                self.eval_field_chain(dot, &receiver, first, path, rest, last)
            }
            Arg::Variable(name, path) => {
                let value = self.var(name)?;
                if path.is_empty() {
                    self.no_args(first, rest, &last)?;
                    Ok(value)
                } else {
                    self.eval_field_chain(dot, &value, first, path, rest, last)
                }
            }
            Arg::Identifier(name) => self.eval_call(dot, first, name, rest, last),
            Arg::Pipe(pipe) => {
                self.no_args(first, rest, &last)?;
                self.eval_pipeline(dot, pipe)
            }
            Arg::Dot => {
                self.no_args(first, rest, &last)?;
                Ok(dot.clone())
            }
            Arg::Literal(Value::Nil) => Err(self.error_at(first, "nil is not a command")),
            Arg::Literal(value) => {
                self.no_args(first, rest, &last)?;
                Ok(value.clone())
            }
        }
    }

    fn no_args(&self, node: &Arg, args: &[Arg], last: &Option<Value>) -> Result<(), ExecError> {
        if args.is_empty() && last.is_none() {
            Ok(())
        } else {
            Err(self.error_at(node, format!("can't give argument to non-function {node}")))
        }
    }

    fn eval_arg(&mut self, dot: &Value, arg: &Arg) -> Result<Value, ExecError> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Field(path) => self.eval_field_chain(dot, dot, arg, path, &[], None),
            Arg::Variable(name, path) => {
                let value = self.var(name)?;
                if path.is_empty() {
                    Ok(value)
                } else {
                    self.eval_field_chain(dot, &value, arg, path, &[], None)
                }
            }
            Arg::Chain(inner, path) => {
                let receiver = self.eval_arg(dot, inner)?;
                self.eval_field_chain(dot, &receiver, arg, path, &[], None)
            }
            Arg::Pipe(pipe) => self.eval_pipeline(dot, pipe),
            Arg::Identifier(name) => self.eval_call(dot, arg, name, &[], None),
        }
    }

    /// `receiver.A.B.C args...`; only the last step receives the arguments.
    fn eval_field_chain(
        &mut self,
        dot: &Value,
        receiver: &Value,
        node: &Arg,
        path: &[String],
        args: &[Arg],
        mut last: Option<Value>,
    ) -> Result<Value, ExecError> {
        let mut current = Cow::Borrowed(receiver);
        for (i, name) in path.iter().enumerate() {
            let (args, last) = if i + 1 == path.len() {
                (args, last.take())
            } else {
                (&[][..], None)
            };
            current = match current {
                Cow::Borrowed(value) => self.eval_field(dot, node, value, name, args, last)?,
                Cow::Owned(value) => {
                    Cow::Owned(self.eval_field(dot, node, &value, name, args, last)?.into_owned())
                }
            };
        }
        Ok(current.into_owned())
    }

    fn eval_field<'v>(
        &mut self,
        dot: &Value,
        node: &Arg,
        receiver: &'v Value,
        name: &str,
        args: &[Arg],
        last: Option<Value>,
    ) -> Result<Cow<'v, Value>, ExecError> {
        match receiver {
            Value::Time(time) => {
                let mut values = self.eval_args(dot, args)?;
                values.extend(last);
                time.call_method(name, &values)
                    .map(Cow::Owned)
                    .map_err(|err| self.error_at(node, err))
            }
            Value::Map(map) => {
                if !args.is_empty() || last.is_some() {
                    return Err(self.error_at(
                        node,
                        format!("{name} is not a method but has arguments"),
                    ));
                }
                map.get(name)
                    .map(Cow::Borrowed)
                    .ok_or_else(|| self.error_at(node, format!("can't evaluate field {name}")))
            }
            Value::Nil => Err(self.error_at(node, format!("nil pointer evaluating {name}"))),
            other => Err(self.error_at(
                node,
                format!("can't evaluate field {name} in type {}", other.kind()),
            )),
        }
    }

    fn eval_args(&mut self, dot: &Value, args: &[Arg]) -> Result<Vec<Value>, ExecError> {
        args.iter().map(|arg| self.eval_arg(dot, arg)).collect()
    }

    fn eval_call(
        &mut self,
        dot: &Value,
        node: &Arg,
        name: &str,
        args: &[Arg],
        last: Option<Value>,
    ) -> Result<Value, ExecError> {
        if let "and" | "or" = name {
            if args.is_empty() && last.is_none() {
                return Err(self.error_at(
                    node,
                    format!("wrong number of args for {name}: want at least 1 got 0"),
                ));
            }
            let mut value = Value::Nil;
            for arg in args {
                value = self.eval_arg(dot, arg)?;
                if value.is_true() != (name == "and") {
                    return Ok(value);
                }
            }
            return Ok(last.unwrap_or(value));
        }

        let funcs = self.funcs;
        let Some(func) = funcs.get(name) else {
            return Err(self.error_at(node, format!("{name:?} is not a defined function")));
        };
        let mut values = self.eval_args(dot, args)?;
        values.extend(last);

        let result =
            func(&values).map_err(|err| self.error_at(node, format!("error calling {name}: {err}")))?;
        if let Value::String(s) = &result {
            if s.len() > MAX_OUTPUT_LEN {
                return Err(self.error_at(
                    node,
                    format!("error calling {name}: result exceeds {MAX_OUTPUT_LEN} bytes"),
                ));
            }
        }
        Ok(result)
    }

    fn var(&self, name: &str) -> Result<Value, ExecError> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| self.error(format!("undefined variable: {name}")))
    }

    fn bind(&mut self, name: &str, value: Value, assign: bool) {
        if assign {
            if let Some(slot) = self.vars.iter_mut().rev().find(|(var, _)| var == name) {
                slot.1 = value;
                return;
            }
        }
        self.vars.push((name.to_string(), value));
    }

    fn error(&self, message: impl Into<String>) -> ExecError {
        ExecError {
            line: self.line,
            message: message.into(),
        }
    }

    fn error_at(&self, node: &Arg, message: impl fmt::Display) -> ExecError {
        self.error(format!("at <{node}>: {message}"))
    }
}
