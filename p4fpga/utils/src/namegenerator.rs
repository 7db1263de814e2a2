use crate::Id;
use std::collections::{HashMap, HashSet};

/// Simple HashMap-based name generator that generates new names for each
/// prefix.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<Id, u64>,
    generated_names: HashSet<Id>,
}

impl NameGenerator {
    /// Create a NameGenerator where `names` are already defined so that this generator
    /// will never generate those names.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Returns a new instance name that starts with `prefix`.
    /// For example:
    /// ```
    /// # use p4fpga_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// assert_eq!(namegen.gen_name("set_nhop"), "set_nhop_0");
    /// assert_eq!(namegen.gen_name("set_nhop"), "set_nhop_1");
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix: Id = prefix.into();
        loop {
            let count = self.name_hash.entry(prefix).or_insert(0);
            let name = Id::from(format!("{}_{}", prefix, count));
            *count += 1;

            // If we've not generated this name before, return it.
            if self.generated_names.insert(name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_previously_defined_names() {
        let mut namegen = NameGenerator::with_prev_defined_names(
            [Id::from("nop_0")].into_iter().collect(),
        );
        assert_eq!(namegen.gen_name("nop"), "nop_1");
        assert_eq!(namegen.gen_name("drop"), "drop_0");
        assert_eq!(namegen.gen_name("nop"), "nop_2");
    }
}
