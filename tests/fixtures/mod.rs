//! In-memory fixture app: a tiny blog domain behind an id-keyed lookup
//! table, standing in for the external record source.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::{json, Value};
use ustr::{ustr, Ustr};

use nested_normalizer::errors::Result;
use nested_normalizer::graph::GraphNormalizer;
use nested_normalizer::payload::PrimaryObject;
use nested_normalizer::record::{
    FieldDescriptor, Record, RecordRef, RecordView, Relation, Resolved, ResolveError,
};
use nested_normalizer::serializer::{BatchOutput, PlainSerializer, RelatedSerializer, Traversal};

pub struct Author {
    pub id: i64,
    pub name: String,
    pub age: i64,
}

pub struct Publisher {
    pub id: i64,
    pub name: String,
}

pub struct Blog {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: i64,
    pub publisher: Option<i64>,
    pub comments: Vec<i64>,
}

pub struct Comment {
    pub id: i64,
    pub text: String,
    pub author: i64,
}

macro_rules! impl_record {
    ($type:ty) => {
        impl Record for $type {
            fn id(&self) -> Value {
                json!(self.id)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

impl_record!(Author);
impl_record!(Publisher);
impl_record!(Blog);
impl_record!(Comment);

/// The opaque record source: everything resolves by id through here.
#[derive(Default)]
pub struct Db {
    pub authors: HashMap<i64, Arc<Author>>,
    pub publishers: HashMap<i64, Arc<Publisher>>,
    pub blogs: HashMap<i64, Arc<Blog>>,
    pub comments: HashMap<i64, Arc<Comment>>,
}

impl Db {
    pub fn new() -> Db {
        Db::default()
    }

    pub fn add_author(&mut self, author: Author) -> Arc<Author> {
        let author = Arc::new(author);
        self.authors.insert(author.id, author.clone());
        author
    }

    pub fn add_publisher(&mut self, publisher: Publisher) -> Arc<Publisher> {
        let publisher = Arc::new(publisher);
        self.publishers.insert(publisher.id, publisher.clone());
        publisher
    }

    pub fn add_blog(&mut self, blog: Blog) -> Arc<Blog> {
        let blog = Arc::new(blog);
        self.blogs.insert(blog.id, blog.clone());
        blog
    }

    pub fn add_comment(&mut self, comment: Comment) -> Arc<Comment> {
        let comment = Arc::new(comment);
        self.comments.insert(comment.id, comment.clone());
        comment
    }

    /// Blogs by a given author, ordered by id.
    pub fn blogs_of(&self, author_id: i64) -> Vec<Arc<Blog>> {
        let mut blogs: Vec<Arc<Blog>> = self
            .blogs
            .values()
            .filter(|blog| blog.author == author_id)
            .cloned()
            .collect();
        blogs.sort_by_key(|blog| blog.id);
        blogs
    }
}

fn downcast<'a, T: 'static>(
    record: &'a dyn Record,
    expected: &str,
) -> std::result::Result<&'a T, ResolveError> {
    record
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("expected a {} record", expected).into())
}

pub struct AuthorView {
    fields: Vec<FieldDescriptor>,
}

impl AuthorView {
    pub fn new() -> AuthorView {
        AuthorView {
            fields: vec![
                FieldDescriptor::scalar("id"),
                FieldDescriptor::scalar("name"),
                FieldDescriptor::scalar("age"),
            ],
        }
    }
}

impl RecordView for AuthorView {
    fn type_name(&self) -> Ustr {
        ustr("author")
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError> {
        let author = downcast::<Author>(record, "author")?;
        Ok(match field.name.as_str() {
            "id" => Resolved::Scalar(json!(author.id)),
            "name" => Resolved::Scalar(json!(author.name)),
            "age" => Resolved::Scalar(json!(author.age)),
            other => return Err(format!("unknown author field '{}'", other).into()),
        })
    }
}

pub struct PublisherView {
    fields: Vec<FieldDescriptor>,
}

impl PublisherView {
    pub fn new() -> PublisherView {
        PublisherView {
            fields: vec![
                FieldDescriptor::scalar("id"),
                FieldDescriptor::scalar("name"),
            ],
        }
    }
}

impl RecordView for PublisherView {
    fn type_name(&self) -> Ustr {
        ustr("publisher")
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError> {
        let publisher = downcast::<Publisher>(record, "publisher")?;
        Ok(match field.name.as_str() {
            "id" => Resolved::Scalar(json!(publisher.id)),
            "name" => Resolved::Scalar(json!(publisher.name)),
            other => return Err(format!("unknown publisher field '{}'", other).into()),
        })
    }
}

/// Blog view over a configurable field list.  Besides the domain fields it
/// understands two probe fields: `secret` (always resolves absent) and
/// `boom` (always fails resolution).
pub struct BlogView {
    db: Arc<Db>,
    fields: Vec<FieldDescriptor>,
}

impl BlogView {
    pub fn new(db: Arc<Db>, fields: Vec<FieldDescriptor>) -> BlogView {
        BlogView { db, fields }
    }

    /// id, title, content, author, publisher: the full declaration.
    pub fn with_author_and_publisher(
        db: Arc<Db>,
        author: Relation,
        publisher: Relation,
    ) -> BlogView {
        BlogView::new(
            db,
            vec![
                FieldDescriptor::scalar("id"),
                FieldDescriptor::scalar("title"),
                FieldDescriptor::scalar("content"),
                FieldDescriptor::relation_one("author", author),
                FieldDescriptor::relation_one("publisher", publisher),
            ],
        )
    }
}

impl RecordView for BlogView {
    fn type_name(&self) -> Ustr {
        ustr("blog")
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError> {
        let blog = downcast::<Blog>(record, "blog")?;
        Ok(match field.name.as_str() {
            "id" => Resolved::Scalar(json!(blog.id)),
            "title" => Resolved::Scalar(json!(blog.title)),
            "content" => Resolved::Scalar(json!(blog.content)),
            "author" => match self.db.authors.get(&blog.author) {
                Some(author) => Resolved::One(RecordRef::Instance(author.clone())),
                None => return Err(format!("dangling author id {}", blog.author).into()),
            },
            "author_ref" => Resolved::One(RecordRef::KeyOnly(json!(blog.author))),
            "publisher" => match blog.publisher {
                None => Resolved::Null,
                Some(publisher_id) => match self.db.publishers.get(&publisher_id) {
                    Some(publisher) => Resolved::One(RecordRef::Instance(publisher.clone())),
                    None => {
                        return Err(format!("dangling publisher id {}", publisher_id).into())
                    }
                },
            },
            "comments" => {
                let mut refs = Vec::with_capacity(blog.comments.len());
                for comment_id in &blog.comments {
                    match self.db.comments.get(comment_id) {
                        Some(comment) => refs.push(RecordRef::Instance(comment.clone())),
                        None => {
                            return Err(format!("dangling comment id {}", comment_id).into())
                        }
                    }
                }
                Resolved::Many(refs)
            }
            "secret" => Resolved::Absent,
            "boom" => return Err("resolver exploded".into()),
            other => return Err(format!("unknown blog field '{}'", other).into()),
        })
    }
}

pub struct CommentView {
    db: Arc<Db>,
    fields: Vec<FieldDescriptor>,
}

impl CommentView {
    pub fn new(db: Arc<Db>, author: Relation) -> CommentView {
        CommentView {
            db,
            fields: vec![
                FieldDescriptor::scalar("id"),
                FieldDescriptor::scalar("text"),
                FieldDescriptor::relation_one("author", author),
            ],
        }
    }
}

impl RecordView for CommentView {
    fn type_name(&self) -> Ustr {
        ustr("comment")
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError> {
        let comment = downcast::<Comment>(record, "comment")?;
        Ok(match field.name.as_str() {
            "id" => Resolved::Scalar(json!(comment.id)),
            "text" => Resolved::Scalar(json!(comment.text)),
            "author" => match self.db.authors.get(&comment.author) {
                Some(author) => Resolved::One(RecordRef::Instance(author.clone())),
                None => return Err(format!("dangling author id {}", comment.author).into()),
            },
            other => return Err(format!("unknown comment field '{}'", other).into()),
        })
    }
}

/// Author view with a many-relation to the author's blogs.
pub struct AuthorWithBlogsView {
    db: Arc<Db>,
    fields: Vec<FieldDescriptor>,
}

impl AuthorWithBlogsView {
    pub fn new(db: Arc<Db>, blogs: Relation) -> AuthorWithBlogsView {
        AuthorWithBlogsView {
            db,
            fields: vec![
                FieldDescriptor::scalar("id"),
                FieldDescriptor::scalar("name"),
                FieldDescriptor::scalar("age"),
                FieldDescriptor::relation_many("blogs", blogs),
            ],
        }
    }
}

impl RecordView for AuthorWithBlogsView {
    fn type_name(&self) -> Ustr {
        ustr("author")
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError> {
        let author = downcast::<Author>(record, "author")?;
        Ok(match field.name.as_str() {
            "id" => Resolved::Scalar(json!(author.id)),
            "name" => Resolved::Scalar(json!(author.name)),
            "age" => Resolved::Scalar(json!(author.age)),
            "blogs" => Resolved::Many(
                self.db
                    .blogs_of(author.id)
                    .into_iter()
                    .map(|blog| RecordRef::Instance(blog))
                    .collect(),
            ),
            other => return Err(format!("unknown author field '{}'", other).into()),
        })
    }
}

/// Late-bound delegate so view graphs with cycles (author -> blog -> author)
/// can be wired up after construction.
#[derive(Default)]
pub struct LazySerializer {
    inner: OnceLock<Arc<dyn RelatedSerializer>>,
}

impl LazySerializer {
    pub fn new() -> LazySerializer {
        LazySerializer::default()
    }

    pub fn wire(&self, serializer: Arc<dyn RelatedSerializer>) {
        self.inner
            .set(serializer)
            .unwrap_or_else(|_| panic!("lazy serializer wired twice"));
    }
}

impl RelatedSerializer for LazySerializer {
    fn serialize_batch(
        &self,
        records: &[Arc<dyn Record>],
        traversal: &mut Traversal,
    ) -> Result<BatchOutput> {
        self.inner
            .get()
            .expect("lazy serializer used before wiring")
            .serialize_batch(records, traversal)
    }
}

/// Normalizing delegates for the fixture types.
pub fn author_relation() -> Relation {
    Relation::new(
        ustr("author"),
        Arc::new(GraphNormalizer::new(Arc::new(AuthorView::new()))),
    )
}

pub fn publisher_relation() -> Relation {
    Relation::new(
        ustr("publisher"),
        Arc::new(GraphNormalizer::new(Arc::new(PublisherView::new()))),
    )
}

/// Plain (non-normalizing) author delegate, standing in for an off-the-shelf
/// serializer that emits final representations directly.
pub fn plain_author_relation() -> Relation {
    Relation::new(
        ustr("author"),
        Arc::new(PlainSerializer::new(|record: &dyn Record| {
            let author = record
                .as_any()
                .downcast_ref::<Author>()
                .expect("author record");
            let mut object = PrimaryObject::new();
            object.insert("id".to_string(), json!(author.id));
            object.insert("name".to_string(), json!(author.name));
            object.insert("age".to_string(), json!(author.age));
            Ok(object)
        })),
    )
}
