//! Small named bitsets, one type per concern.
//!
//! Each set displays as a space-separated list of flag names and parses
//! back from the same form (case-insensitive), which is also its serde
//! representation.

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $( $(#[$fmeta:meta])* const $flag:ident = $bit:expr, $label:literal; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name($repr);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: Self = Self($bit); )+

            pub const NONE: Self = Self(0);

            const NAMED: &'static [(&'static str, Self)] = &[ $( ($label, Self::$flag) ),+ ];

            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// All bits of `other` are present.
            pub const fn has(self, other: Self) -> bool {
                other.0 != 0 && (self.0 & other.0) == other.0
            }

            /// At least one bit of `other` is present.
            pub const fn has_any(self, other: Self) -> bool {
                (self.0 & other.0) != 0
            }

            pub fn set(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn clear(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn toggle(&mut self, other: Self, on: bool) {
                if on {
                    self.set(other)
                } else {
                    self.clear(other)
                }
            }

            pub fn names(self) -> Vec<&'static str> {
                Self::NAMED
                    .iter()
                    .filter(|(_, flag)| self.has(*flag))
                    .map(|(label, _)| *label)
                    .collect()
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Self::NAMED
                    .iter()
                    .find(|(label, _)| label.eq_ignore_ascii_case(name))
                    .map(|(_, flag)| *flag)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl std::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self(!self.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let names = self.names();
                if names.is_empty() {
                    f.write_str("None")
                } else {
                    f.write_str(&names.join(" "))
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let mut out = Self::NONE;
                for part in s.split(|c: char| c.is_whitespace() || c == ',' || c == '|') {
                    if part.is_empty() || part.eq_ignore_ascii_case("none") {
                        continue;
                    }
                    match Self::from_name(part) {
                        Some(flag) => out.set(flag),
                        None => {
                            return Err(format!(
                                "unknown {} \"{}\", must be one of: {}",
                                stringify!($name),
                                part,
                                Self::NAMED.iter().map(|(l, _)| *l).collect::<Vec<_>>().join(", ")
                            ))
                        }
                    }
                }
                Ok(out)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_seq(self.names())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let names: Vec<String> = serde::Deserialize::deserialize(deserializer)?;
                names.join(" ").parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use flag_set;

#[cfg(test)]
mod tests {
    flag_set! {
        pub struct Sample: u8 {
            const A = 1, "Alpha";
            const B = 2, "Beta";
            const C = 4, "Gamma";
        }
    }

    #[test]
    fn parse_and_display_round_trip() {
        let set: Sample = "alpha gamma".parse().unwrap();
        assert!(set.has(Sample::A));
        assert!(!set.has(Sample::B));
        assert_eq!(set.to_string(), "Alpha Gamma");
        assert_eq!(Sample::NONE.to_string(), "None");
    }

    #[test]
    fn partial_updates_do_not_overwrite() {
        let mut set = Sample::A | Sample::B;
        set.set(Sample::C);
        set.clear(Sample::A);
        assert_eq!(set, Sample::B | Sample::C);
        assert!(set.has_any(Sample::A | Sample::B));
        assert!(!set.has(Sample::A | Sample::B));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("Alpha Delta".parse::<Sample>().is_err());
    }
}
