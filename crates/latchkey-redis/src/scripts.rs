// Server-side check-and-write scripts
// KEYS[1] is the lock key; ARGV carries the expected value first

use redis::Script;

/// `ARGV = [expected, new, ttl_ms]`; returns 1 iff swapped
const COMPARE_AND_SWAP: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    return 1
end
return 0
";

/// `ARGV = [expected]`; returns 1 iff deleted
const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Scripts are hashed once; invocation tries `EVALSHA` and falls back to `EVAL`
pub(crate) struct Scripts {
    pub(crate) compare_and_swap: Script,
    pub(crate) compare_and_delete: Script,
}

impl Scripts {
    pub(crate) fn new() -> Self {
        Self {
            compare_and_swap: Script::new(COMPARE_AND_SWAP),
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        }
    }
}
