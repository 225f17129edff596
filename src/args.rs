use nom::branch::alt;
use nom::bytes::complete::escaped;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while1;
use nom::character::complete::multispace0;
use nom::character::complete::none_of;
use nom::combinator::all_consuming;
use nom::error::{FromExternalError, ParseError};
use nom::multi::separated_list0;
use nom::sequence::delimited;
use nom::sequence::separated_pair;
use nom::IResult;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::Error;

/// `key=value` arguments.
///
/// Used to select and identify devices (`driver=rsa, id=0`) and as the command line of the
/// `iq_stream` tool (`dev=0 cf=2.4e9 bw=40e6`).
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Args {
    map: BTreeMap<String, String>,
}

impl Args {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
    /// Parse separate `key=value` tokens, e.g., the process arguments.
    ///
    /// Tokens are split at the first `=`. The rest of the token is taken verbatim as the
    /// value, so it may contain spaces, commas, or further `=`.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Args::new();
        for t in tokens {
            let (k, v) = t.as_ref().split_once('=').ok_or(Error::ValueError)?;
            let k = k.trim();
            if k.is_empty() || k.contains(|c: char| c == ',' || c.is_whitespace()) {
                return Err(Error::ValueError);
            }
            args.map.insert(k.to_string(), v.to_string());
        }
        Ok(args)
    }
    pub fn get<V: FromStr<Err = impl std::error::Error>>(
        &self,
        v: impl AsRef<str>,
    ) -> Result<V, Error> {
        self.map
            .get(v.as_ref())
            .ok_or(Error::NotFound)
            .and_then(|v| v.parse().or(Err(Error::ValueError)))
    }
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.map.insert(key.into(), value.into())
    }
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, String> {
        self.map.iter()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
    /// Deserialize into a typed configuration.
    ///
    /// All values are strings, so numeric fields need `serde_with::DisplayFromStr`.
    pub fn deserialize<D: for<'a> Deserialize<'a>>(&self) -> Result<D, Error> {
        let v = serde_json::to_value(self).or(Err(Error::ValueError))?;
        serde_json::from_value(v).map_err(|e| {
            log::debug!("cannot deserialize args ({self}): {e}");
            Error::ValueError
        })
    }
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.map.fmt(f)
    }
}

impl std::fmt::Display for Args {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut i = self.iter();
        if let Some((k, v)) = i.next() {
            write!(fmt, "{}={}", k, v)?;
            for (k, v) in i {
                write!(fmt, ", {}={}", k, v)?;
            }
        }
        Ok(())
    }
}

fn parse_string<'a, E>(input: &'a str) -> IResult<&'a str, &'a str, E>
where
    E: ParseError<&'a str> + FromExternalError<&'a str, std::num::ParseIntError> + std::fmt::Debug,
{
    let esc_single = escaped(none_of("\\\'"), '\\', tag("'"));
    let esc_or_empty_single = alt((esc_single, tag("")));
    let esc_double = escaped(none_of("\\\""), '\\', tag("\""));
    let esc_or_empty_double = alt((esc_double, tag("")));
    let filter = |c: char| c != ',' && c != '=' && !c.is_whitespace();

    delimited(
        multispace0,
        alt((
            delimited(tag("'"), esc_or_empty_single, tag("'")),
            delimited(tag("\""), esc_or_empty_double, tag("\"")),
            take_while1(filter),
        )),
        multispace0,
    )(input)
}

impl FromStr for Args {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = all_consuming(separated_list0(
            delimited(multispace0, tag(","), multispace0),
            separated_pair(
                parse_string::<nom::error::Error<_>>,
                delimited(multispace0, tag("="), multispace0),
                parse_string,
            ),
        ))(s.trim())
        .or(Err(Error::ValueError))?;
        Ok(Args {
            map: v.1.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
        })
    }
}

impl TryFrom<&str> for Args {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Args {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&String> for Args {
    type Error = Error;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<&Args> for Args {
    fn from(value: &Args) -> Self {
        value.clone()
    }
}

impl Default for Args {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty() {
        let c: Args = "".parse().unwrap();
        assert!(c.is_empty());
    }
    #[test]
    fn deserialize_more() {
        let c: Args = "driver=rsa,id=1".parse().unwrap();
        assert_eq!(c.get::<String>("driver").unwrap(), "rsa");
        assert_eq!(c.get::<i32>("id").unwrap(), 1);
        assert_eq!(c.iter().count(), 2);
    }
    #[test]
    fn deserialize_whitespace() {
        let c: Args = "   driver  = dummy  ,     id=0    ".parse().unwrap();
        assert_eq!(c.get::<String>("driver").unwrap(), "dummy");
        assert_eq!(c.get::<u32>("id").unwrap(), 0);
    }
    #[test]
    fn deserialize_quoted() {
        let c: Args = "fn='my capture',serial=\"B0 10\"".parse().unwrap();
        assert_eq!(c.get::<String>("fn").unwrap(), "my capture");
        assert_eq!(c.get::<String>("serial").unwrap(), "B0 10");
    }
    #[test]
    fn reject_trailing_garbage() {
        assert!("cf=1e9,".parse::<Args>().is_err());
        assert!("cf".parse::<Args>().is_err());
    }
    #[test]
    fn typed_get() {
        let c: Args = "cf=2.4e9,bw=lol".parse().unwrap();
        assert_eq!(c.get::<f64>("cf").unwrap(), 2.4e9);
        assert!(matches!(c.get::<f64>("bw"), Err(Error::ValueError)));
        assert!(matches!(c.get::<f64>("rl"), Err(Error::NotFound)));
    }
    #[test]
    fn tokens() {
        let c = Args::from_tokens(["dev=0", "cf=1e9", "fn=out"]).unwrap();
        assert_eq!(c.get::<i32>("dev").unwrap(), 0);
        assert_eq!(c.get::<f64>("cf").unwrap(), 1e9);
        assert_eq!(c.get::<String>("fn").unwrap(), "out");
        assert!(Args::from_tokens(["msec"]).is_err());
        assert!(Args::from_tokens(["=5"]).is_err());
        assert!(Args::from_tokens(["dev,cf=1"]).is_err());
    }
    #[test]
    fn tokens_keep_value_verbatim() {
        let c = Args::from_tokens(["fn=my capture", "dev=0,cf=1"]).unwrap();
        assert_eq!(c.get::<String>("fn").unwrap(), "my capture");
        assert_eq!(c.get::<String>("dev").unwrap(), "0,cf=1");
        assert!(matches!(c.get::<i32>("dev"), Err(Error::ValueError)));

        let c = Args::from_tokens(["fn=run1,ch2"]).unwrap();
        assert_eq!(c.get::<String>("fn").unwrap(), "run1,ch2");
        let c = Args::from_tokens(["fn=a=b"]).unwrap();
        assert_eq!(c.get::<String>("fn").unwrap(), "a=b");
    }
    #[test]
    fn display_is_sorted() {
        let c: Args = "id=3,driver=dummy".parse().unwrap();
        assert_eq!(c.to_string(), "driver=dummy, id=3");
    }
    #[test]
    fn serde() {
        use serde_with::serde_as;
        use serde_with::DisplayFromStr;

        #[serde_as]
        #[derive(Deserialize)]
        struct Foo {
            #[serde_as(as = "DisplayFromStr")]
            msec: u32,
        }

        let c: Args = "msec=123".parse().unwrap();
        let f: Foo = c.deserialize().unwrap();
        assert_eq!(f.msec, 123);
    }
}
