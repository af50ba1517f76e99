//! Naming conventions for generated tables, columns, and classes.
//!
//! | Input | Operation | Output (default config) |
//! |-------|-----------|-------------------------|
//! | `ProcessActivity` | [`NamingConvention::table_name`] | `ocsf_process_activity` |
//! | `process_activity` | [`NamingConvention::class_name`] | `OcsfProcessActivity` |
//! | `device` | [`NamingConvention::foreign_key_column`] | `device_id` |
//! | `process`, `loaded_modules` | [`NamingConvention::association_table_name`] | `ocsf_process_loaded_modules` |
//!
//! Configuration is a plain [`NamingConfig`] value handed to the constructor.

/// Prefixes and suffixes applied to generated names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    pub table_prefix: String,
    pub table_suffix: String,
    pub class_prefix: String,
    pub class_suffix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            table_prefix: "ocsf_".to_string(),
            table_suffix: String::new(),
            class_prefix: "Ocsf".to_string(),
            class_suffix: String::new(),
        }
    }
}

/// String transforms from OCSF names to generated identifiers.
#[derive(Debug, Clone, Default)]
pub struct NamingConvention {
    config: NamingConfig,
}

impl NamingConvention {
    pub fn new(config: NamingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    /// Convert to `snake_case`.
    ///
    /// Handles PascalCase, camelCase, kebab-case, runs of capitals
    /// (`HTTPServer` → `http_server`) and digits (`Process2Activity` →
    /// `process2_activity`).
    pub fn to_snake_case(&self, name: &str) -> String {
        to_snake_case(name)
    }

    /// Convert to `PascalCase`.
    ///
    /// Each `_`, `-`, or whitespace separated word gets an upper-case first
    /// letter and a lower-cased remainder, so `ProcessActivity` with no
    /// separators becomes `Processactivity`.
    pub fn to_pascal_case(&self, name: &str) -> String {
        to_pascal_case(name)
    }

    pub fn to_camel_case(&self, name: &str) -> String {
        let pascal = to_pascal_case(name);
        let mut chars = pascal.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => pascal,
        }
    }

    pub fn table_name(&self, name: &str) -> String {
        format!(
            "{}{}{}",
            self.config.table_prefix,
            to_snake_case(name),
            self.config.table_suffix
        )
    }

    pub fn class_name(&self, name: &str) -> String {
        format!(
            "{}{}{}",
            self.config.class_prefix,
            to_pascal_case(name),
            self.config.class_suffix
        )
    }

    pub fn column_name(&self, name: &str) -> String {
        to_snake_case(name)
    }

    pub fn foreign_key_column(&self, relationship_name: &str) -> String {
        format!("{}_id", to_snake_case(relationship_name))
    }

    /// Backing table for an array attribute of `parent_name`.
    ///
    /// A function of `(parent, attribute)` and the config only.
    pub fn association_table_name(&self, parent_name: &str, attribute_name: &str) -> String {
        self.table_name(&format!(
            "{}_{}",
            to_snake_case(parent_name),
            to_snake_case(attribute_name)
        ))
    }

    /// Class mapped onto a primitive-array backing table.
    pub fn array_class_name(&self, parent_name: &str, attribute_name: &str) -> String {
        self.class_name(&format!(
            "{}_{}",
            to_snake_case(parent_name),
            to_snake_case(attribute_name)
        ))
    }

    pub fn relationship_name(&self, name: &str) -> String {
        to_snake_case(name)
    }

    pub fn enum_name(&self, name: &str) -> String {
        format!("{}{}", self.config.class_prefix, to_pascal_case(name))
    }

    /// `UPPER_SNAKE_CASE` member name, safe to use as a Python identifier.
    pub fn enum_value_name(&self, caption: &str) -> String {
        let cleaned: String = caption
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let upper = to_snake_case(&cleaned).to_uppercase();
        match upper.chars().next() {
            None => "UNKNOWN".to_string(),
            Some(c) if c.is_ascii_digit() => format!("VALUE_{upper}"),
            Some(_) => upper,
        }
    }

    /// Polymorphic identity stored in the discriminator column.
    pub fn discriminator_value(&self, name: &str) -> String {
        to_snake_case(name)
    }
}

fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();

    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if boundary {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    // Collapse runs of underscores and trim the ends.
    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

fn to_pascal_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
