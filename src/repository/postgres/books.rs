use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{conflict_on_unique, PgRepository};
use crate::{
    error::{AppError, AppResult},
    models::{Book, Page},
    repository::BookRepository,
};

#[derive(sqlx::FromRow)]
struct BookRow {
    id: Uuid,
    title: String,
    author: String,
    category: String,
    code: String,
    price: rust_decimal::Decimal,
    total_copies: i32,
    available_copies: i32,
    description: Option<String>,
    is_deleted: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            category: row.category,
            code: row.code,
            price: row.price,
            total_copies: row.total_copies,
            available_copies: row.available_copies,
            description: row.description,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_book_filters(builder: &mut QueryBuilder<'_, Postgres>, category: Option<&str>, search: Option<&str>) {
    builder.push(" WHERE NOT is_deleted");
    if let Some(category) = category {
        builder.push(" AND category = ").push_bind(category.to_string());
    }
    if let Some(search) = search {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl BookRepository for PgRepository {
    async fn get_book(&self, id: Uuid) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Book::from))
    }

    async fn find_book_by_code(&self, code: &str) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Book::from))
    }

    async fn insert_book(&self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, category, code, price, total_copies,
                               available_copies, description, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.category)
        .bind(&book.code)
        .bind(book.price)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(&book.description)
        .bind(book.is_deleted)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Book with this ISBN exists"))?;
        Ok(())
    }

    async fn update_book_details(&self, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, author = $3, category = $4, code = $5, price = $6,
                description = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.category)
        .bind(&book.code)
        .bind(book.price)
        .bind(&book.description)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Book with this ISBN exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        Ok(())
    }

    async fn resize_book(&self, id: Uuid, total_copies: i32) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books
            SET available_copies = available_copies + ($2 - total_copies),
                total_copies = $2
            WHERE id = $1 AND available_copies + ($2 - total_copies) >= 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(total_copies)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => match self.get_book(id).await? {
                Some(_) => Err(AppError::BadRequest(
                    "Cannot remove copies that are currently borrowed".to_string(),
                )),
                None => Err(AppError::NotFound("Book not found".to_string())),
            },
        }
    }

    async fn soft_delete_book(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("UPDATE books SET is_deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_books(&self, category: Option<&str>, search: Option<&str>, page: Page) -> AppResult<(Vec<Book>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_book_filters(&mut count, category, search);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM books");
        push_book_filters(&mut query, category, search);
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<BookRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows.into_iter().map(Book::from).collect(), total))
    }
}
