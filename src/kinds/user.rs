//! `user`: an account record under `users/<name>`.
//!
//! The account travels in the `user` snapshot with the password column
//! redacted. APPLY asks the secret source for it again; only its blake3
//! hash is ever written to the store.

use anyhow::Context;
use declarative::{ApplyContext, Collaborator, Entity, Filter, Reader, ReconstructContext, Table};
use wirekit::{SnapshotSpec, Value, WireBuffer, WireReader};

use super::Source;

pub const SUBTREE: &str = "users";
pub const TABLE: &str = "user";

const NAME: usize = 0;
const FULL_NAME: usize = 1;
const PASSWORD: usize = 2;

#[derive(Debug, Default)]
pub struct UserKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub full_name: String,
    pub password: Option<String>,
}

pub fn password_hash(password: &str) -> String {
    blake3::hash(password.as_bytes()).to_hex().to_string()
}

fn store_path(name: &str) -> String {
    format!("{SUBTREE}/{name}")
}

impl Collaborator for UserKind {
    type Spec = Account;

    fn kind(&self) -> &'static str {
        "user"
    }

    fn subtree(&self) -> &str {
        SUBTREE
    }

    fn encode_spec(&self, _spec: &Account, _out: &mut WireBuffer) -> wirekit::Result<()> {
        Ok(())
    }

    fn decode_spec(
        &self,
        key: &str,
        _reader: &mut WireReader<'_>,
        ctx: &mut ReconstructContext<'_, '_>,
    ) -> anyhow::Result<Account> {
        let row = ctx.lookup(TABLE, NAME, &Value::from(key))?;
        let password = if row.is_redacted(PASSWORD) {
            ctx.find_secret(TABLE, "password", key)?
        } else {
            row.opt_text(PASSWORD)?.map(str::to_string)
        };
        Ok(Account {
            full_name: row.text(FULL_NAME)?.to_string(),
            password,
        })
    }

    fn install(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<Account>) -> anyhow::Result<()> {
        let Some(password) = &entity.spec.password else {
            anyhow::bail!("no password for user {}", entity.key);
        };
        let base = store_path(&entity.key);
        ctx.store
            .set(&format!("{base}/full_name"), &entity.spec.full_name)
            .with_context(|| format!("Failed to write user {}", entity.key))?;
        ctx.store
            .set(&format!("{base}/password_hash"), &password_hash(password))
            .with_context(|| format!("Failed to write user {}", entity.key))
    }

    fn uninstall(&self, ctx: &mut ApplyContext<'_>, entity: &Entity<Account>) -> anyhow::Result<()> {
        ctx.store.delete(&store_path(&entity.key))?;
        Ok(())
    }
}

impl Reader<Source<'_>> for UserKind {
    fn read(&self, source: &Source<'_>, _filter: &Filter) -> anyhow::Result<Vec<Entity<Account>>> {
        Ok(source
            .manifest
            .user
            .iter()
            .map(|decl| {
                let account = Account {
                    full_name: decl.full_name.clone(),
                    password: decl.password.clone(),
                };
                source.entity(&decl.name, &decl.component, &store_path(&decl.name), account)
            })
            .collect())
    }

    fn snapshot(
        &self,
        _source: &Source<'_>,
        entities: &[Entity<Account>],
    ) -> anyhow::Result<Option<Table>> {
        let mut table = Table::new(SnapshotSpec::new(TABLE, 3).lookup(NAME).redact(PASSWORD));
        for entity in entities {
            table.push(vec![
                Value::from(entity.key.as_str()),
                Value::from(entity.spec.full_name.as_str()),
                entity
                    .spec
                    .password
                    .as_deref()
                    .map_or(Value::Null, Value::from),
            ]);
        }
        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ConfigStore, MemoryStore, SecretSource};
    use wirekit::SnapshotSet;

    struct One;

    impl SecretSource for One {
        fn resolve(&self, _table: &str, _column: &str, id: &str) -> anyhow::Result<Option<String>> {
            Ok((id == "alice").then(|| "s3cret".to_string()))
        }
    }

    fn wrapped() -> WireBuffer {
        let entities = vec![
            Entity::new(
                "alice",
                "core",
                Account {
                    full_name: "Alice".to_string(),
                    password: Some("plain".to_string()),
                },
            ),
            Entity::new(
                "bob",
                "core",
                Account {
                    full_name: "Bob".to_string(),
                    password: None,
                },
            ),
        ];
        let manifest = crate::manifest::Manifest::default();
        let store = MemoryStore::new();
        let source = Source {
            manifest: &manifest,
            store: &store,
            operation: declarative::Operation::Install,
        };
        let table = UserKind.snapshot(&source, &entities).unwrap().unwrap();
        let mut buffer = WireBuffer::new();
        wirekit::wrap(&mut buffer, &table.spec, &table.rows).unwrap();
        buffer
    }

    #[test]
    fn test_password_never_reaches_the_buffer() {
        assert!(!wrapped().as_str().contains("plain"));
    }

    #[test]
    fn test_decode_resolves_password_from_secrets() {
        let buffer = wrapped();
        let mut reader = buffer.reader();
        let mut set = SnapshotSet::collect(&mut reader).unwrap();
        let secrets = One;
        let mut ctx = ReconstructContext::new(&mut set, &secrets);
        let empty = WireBuffer::new();

        let alice = UserKind
            .decode_spec("alice", &mut empty.reader(), &mut ctx)
            .unwrap();
        assert_eq!(alice.full_name, "Alice");
        assert_eq!(alice.password.as_deref(), Some("s3cret"));

        let bob = UserKind
            .decode_spec("bob", &mut empty.reader(), &mut ctx)
            .unwrap();
        assert_eq!(bob.password, None);

        assert!(UserKind
            .decode_spec("carol", &mut empty.reader(), &mut ctx)
            .is_err());
    }

    #[test]
    fn test_install_writes_hash_only() {
        let mut store = MemoryStore::new();
        let entity = Entity::new(
            "alice",
            "core",
            Account {
                full_name: "Alice".to_string(),
                password: Some("s3cret".to_string()),
            },
        );
        let mut ctx = ApplyContext::new(&mut store);
        UserKind.install(&mut ctx, &entity).unwrap();
        drop(ctx);

        assert_eq!(
            store.get("users/alice/password_hash"),
            Some(password_hash("s3cret"))
        );
        assert!(!store.entries().iter().any(|(_, v)| v == "s3cret"));
    }

    #[test]
    fn test_install_without_password_fails_before_writing() {
        let mut store = MemoryStore::new();
        let entity = Entity::new(
            "bob",
            "core",
            Account {
                full_name: "Bob".to_string(),
                password: None,
            },
        );
        let mut ctx = ApplyContext::new(&mut store);
        assert!(UserKind.install(&mut ctx, &entity).is_err());
        drop(ctx);
        assert!(!store.exists("users/bob"));
    }
}
