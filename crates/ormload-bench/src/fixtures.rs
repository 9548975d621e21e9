//! Mapping and data generation for benchmarks.
//!
//! Data is deterministic so runs are comparable.

use ormload_core::dialect::Dialect;
use ormload_core::mapping::{AssociationDef, CollectionSemantics, ElementDef, IdentifierDef, PropertyDef};
use ormload_core::{CollectionPersister, EntityPersister, LoaderSettings, MappingRegistry, ValueType};
use rusqlite::{params, Connection};

/// Scale factor for benchmark data generation.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// 10 users, 2 posts each
    Tiny,
    /// 100 users, 5 posts each
    Small,
    #[default]
    Medium,
}

impl Scale {
    /// Number of users.
    pub fn count(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 2_000,
        }
    }

    pub fn posts_per_user(&self) -> usize {
        match self {
            Scale::Tiny => 2,
            Scale::Small | Scale::Medium => 5,
        }
    }

    pub fn comments_per_post(&self) -> usize {
        match self {
            Scale::Tiny => 1,
            Scale::Small => 3,
            Scale::Medium => 2,
        }
    }
}

/// Blog mapping: users own posts and tags, posts own comments.
pub fn blog_registry(dialect: Dialect, settings: LoaderSettings) -> MappingRegistry {
    let registry = MappingRegistry::builder(dialect)
        .with_settings(settings)
        .with_entity(
            EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("name", "name", ValueType::String))
                .with_property(PropertyDef::basic("email", "email", ValueType::String))
                .with_property(PropertyDef::collection("posts", "User.posts"))
                .with_property(PropertyDef::collection("tags", "User.tags")),
        )
        .with_entity(
            EntityPersister::new("Post", "posts", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("title", "title", ValueType::String))
                .with_property(PropertyDef::basic("views", "views", ValueType::Long))
                .with_property(PropertyDef::many_to_one(
                    "author",
                    AssociationDef::new("User", vec!["author_id".into()]),
                ))
                .with_property(PropertyDef::collection("comments", "Post.comments")),
        )
        .with_entity(
            EntityPersister::new("Comment", "comments", IdentifierDef::new("id", "id", ValueType::Long))
                .with_property(PropertyDef::basic("body", "body", ValueType::String))
                .with_property(PropertyDef::many_to_one(
                    "post",
                    AssociationDef::new("Post", vec!["post_id".into()]),
                )),
        )
        .with_collection(
            CollectionPersister::new(
                "User.posts",
                "User",
                vec!["author_id".into()],
                ElementDef::OneToMany {
                    entity: "Post".into(),
                    columns: Vec::new(),
                },
            )
            .with_semantics(CollectionSemantics::Set),
        )
        .with_collection(
            CollectionPersister::new(
                "Post.comments",
                "Post",
                vec!["post_id".into()],
                ElementDef::OneToMany {
                    entity: "Comment".into(),
                    columns: Vec::new(),
                },
            )
            .with_semantics(CollectionSemantics::Set),
        )
        .with_collection(
            CollectionPersister::new(
                "User.tags",
                "User",
                vec!["user_id".into()],
                ElementDef::Basic {
                    column: "tag".into(),
                    value_type: ValueType::String,
                },
            )
            .with_table("user_tags"),
        )
        .build();
    match registry {
        Ok(registry) => registry,
        Err(e) => panic!("blog mapping is invalid: {e}"),
    }
}

/// Insert users, posts, comments and tags for `scale`.
pub fn populate(connection: &Connection, scale: Scale) -> rusqlite::Result<()> {
    connection.execute_batch("begin")?;
    let mut post_id = 0i64;
    let mut comment_id = 0i64;
    for user in 0..scale.count() as i64 {
        connection.execute(
            "insert into users (id, name, email) values (?1, ?2, ?3)",
            params![user, format!("user{user}"), format!("user{user}@example.com")],
        )?;
        for tag in ["rust", "sql"] {
            connection.execute("insert into user_tags (user_id, tag) values (?1, ?2)", params![user, tag])?;
        }
        for _ in 0..scale.posts_per_user() {
            connection.execute(
                "insert into posts (id, title, views, author_id) values (?1, ?2, ?3, ?4)",
                params![post_id, format!("post {post_id}"), post_id * 7 % 1000, user],
            )?;
            for _ in 0..scale.comments_per_post() {
                connection.execute(
                    "insert into comments (id, body, post_id) values (?1, ?2, ?3)",
                    params![comment_id, format!("comment {comment_id}"), post_id],
                )?;
                comment_id += 1;
            }
            post_id += 1;
        }
    }
    connection.execute_batch("commit")
}
