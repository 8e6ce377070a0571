//! Command interpreter for the cache shell

use std::collections::BTreeMap;
use std::fmt;

use shardlru::{Handle, ShardedLruCache};

/// Result of one shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Integer(usize),
    /// Id of a newly tracked handle
    Handle(u64),
    Value { id: u64, value: String },
    Nil,
    Text(String),
    Error(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Handle(id) => write!(f, "#{}", id),
            Reply::Value { id, value } => write!(f, "#{} {}", id, value),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Text(text) => write!(f, "{}", text.trim_end()),
            Reply::Error(msg) => write!(f, "{}", msg),
        }
    }
}

/// Drives a string cache and keeps track of the handles it hands out
pub struct Shell {
    cache: ShardedLruCache<String, String>,
    handles: BTreeMap<u64, Handle<String, String>>,
    next_id: u64,
}

impl Shell {
    pub fn new(cache: ShardedLruCache<String, String>) -> Self {
        Self {
            cache,
            handles: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Run one line. Blank lines and `#` comments produce no reply.
    pub fn execute(&mut self, line: &str) -> Option<Reply> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut parts = line.split_whitespace();
        let command = parts.next()?.to_uppercase();
        let args: Vec<&str> = parts.collect();

        let reply = match command.as_str() {
            "INSERT" => self.handle_insert(&args),
            "LOOKUP" => self.handle_lookup(&args),
            "RELEASE" => self.handle_release(&args),
            "ERASE" => self.handle_erase(&args),
            "PRUNE" => self.handle_prune(&args),
            "DUMP" => Reply::Text(self.cache.debug_dump()),
            "STATS" => self.handle_stats(),
            "HANDLES" => self.handle_handles(),
            "LEN" => Reply::Integer(self.cache.len()),
            "USAGE" => Reply::Integer(self.cache.total_usage()),
            _ => Reply::Error(format!("ERR unknown command '{}'", command)),
        };
        Some(reply)
    }

    /// Release every handle still outstanding; returns how many there were
    pub fn finish(mut self) -> usize {
        let outstanding = std::mem::take(&mut self.handles);
        let count = outstanding.len();
        for (_, handle) in outstanding {
            // handles always come from self.cache
            let _ = self.cache.release(handle);
        }
        count
    }

    fn track(&mut self, handle: Handle<String, String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handles.insert(id, handle);
        id
    }

    fn handle_insert(&mut self, args: &[&str]) -> Reply {
        let charge = match args {
            [_, _] => 1,
            [_, _, charge] => match charge.parse::<usize>() {
                Ok(charge) => charge,
                Err(_) => return Reply::Error(format!("ERR invalid charge '{}'", charge)),
            },
            _ => {
                return Reply::Error(
                    "ERR wrong number of arguments for 'insert' command".to_string(),
                )
            }
        };

        let handle = self
            .cache
            .insert_with_charge(args[0].to_string(), args[1].to_string(), charge);
        Reply::Handle(self.track(handle))
    }

    fn handle_lookup(&mut self, args: &[&str]) -> Reply {
        if args.len() != 1 {
            return Reply::Error("ERR wrong number of arguments for 'lookup' command".to_string());
        }

        match self.cache.lookup(args[0]) {
            Some(handle) => {
                let value = handle.value().clone();
                Reply::Value {
                    id: self.track(handle),
                    value,
                }
            }
            None => Reply::Nil,
        }
    }

    fn handle_release(&mut self, args: &[&str]) -> Reply {
        if args.len() != 1 {
            return Reply::Error(
                "ERR wrong number of arguments for 'release' command".to_string(),
            );
        }

        let id = match args[0].trim_start_matches('#').parse::<u64>() {
            Ok(id) => id,
            Err(_) => return Reply::Error(format!("ERR invalid handle id '{}'", args[0])),
        };

        match self.handles.remove(&id) {
            Some(handle) => match self.cache.release(handle) {
                Ok(()) => Reply::Ok,
                Err(e) => {
                    let reply = Reply::Error(format!("ERR {}", e));
                    // a refused handle still holds its reference
                    self.handles.insert(id, e.into_handle());
                    reply
                }
            },
            None => Reply::Error(format!("ERR no outstanding handle #{}", id)),
        }
    }

    fn handle_erase(&mut self, args: &[&str]) -> Reply {
        if args.is_empty() {
            return Reply::Error("ERR wrong number of arguments for 'erase' command".to_string());
        }

        let erased = args.iter().filter(|key| self.cache.erase(**key)).count();
        Reply::Integer(erased)
    }

    fn handle_prune(&mut self, args: &[&str]) -> Reply {
        if !args.is_empty() {
            return Reply::Error("ERR wrong number of arguments for 'prune' command".to_string());
        }
        Reply::Integer(self.cache.prune())
    }

    fn handle_stats(&self) -> Reply {
        let stats = self.cache.stats();
        Reply::Text(format!(
            "entries:{}\n\
             usage:{}\n\
             detached_usage:{}\n\
             capacity:{}\n\
             shards:{}\n\
             shard_capacity:{}\n\
             hits:{}\n\
             misses:{}\n\
             hit_ratio:{:.2}\n\
             inserts:{}\n\
             evictions:{}\n\
             erases:{}\n\
             pruned:{}\n\
             outstanding_handles:{}",
            self.cache.len(),
            self.cache.total_usage(),
            self.cache.detached_usage(),
            self.cache.total_capacity(),
            self.cache.shard_count(),
            self.cache.shard_capacity(),
            stats.hits(),
            stats.misses(),
            stats.hit_ratio(),
            stats.inserts(),
            stats.evictions(),
            stats.erases(),
            stats.pruned(),
            self.handles.len(),
        ))
    }

    fn handle_handles(&self) -> Reply {
        if self.handles.is_empty() {
            return Reply::Text("(empty)".to_string());
        }

        let lines: Vec<String> = self
            .handles
            .iter()
            .map(|(id, handle)| {
                format!(
                    "#{} key:{} refs:{} charge:{} cached:{}",
                    id,
                    handle.key(),
                    handle.refs(),
                    handle.charge(),
                    handle.is_cached()
                )
            })
            .collect();
        Reply::Text(lines.join("\n"))
    }
}
