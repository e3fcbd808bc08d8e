//! Inventory ledger: book catalog and copy counters

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        Actor, Book, Page,
    },
    repository::SharedRepository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: SharedRepository,
    clock: Arc<dyn Clock>,
}

impl BooksService {
    pub fn new(repository: SharedRepository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn create_book(&self, actor: Actor, data: CreateBook) -> AppResult<Book> {
        actor.require_admin()?;
        data.validate()?;

        if self.repository.find_book_by_code(&data.code).await?.is_some() {
            return Err(AppError::Conflict("Book with this ISBN exists".to_string()));
        }

        let settings = self.repository.current_settings().await?;
        let copies = data.total_copies.unwrap_or(settings.copies_per_book);
        let now = self.clock.now();
        let book = Book {
            id: Uuid::new_v4(),
            title: data.title,
            author: data.author,
            category: data.category,
            code: data.code,
            price: data.price,
            total_copies: copies,
            available_copies: copies,
            description: data.description,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert_book(&book).await?;
        tracing::info!("Book created: {} ({})", book.title, book.id);
        Ok(book)
    }

    pub async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = Page::new(query.page, query.per_page);
        self.repository
            .list_books(query.category.as_deref(), query.search.as_deref(), page)
            .await
    }

    /// A live (not deleted) book
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository
            .get_book(id)
            .await?
            .filter(|b| !b.is_deleted)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    pub async fn update_book(&self, actor: Actor, id: Uuid, data: UpdateBook) -> AppResult<Book> {
        actor.require_admin()?;
        data.validate()?;

        let mut book = self.get_book(id).await?;
        if let Some(code) = data.code {
            if code != book.code {
                if let Some(other) = self.repository.find_book_by_code(&code).await? {
                    if other.id != id {
                        return Err(AppError::Conflict("Book with this ISBN exists".to_string()));
                    }
                }
                book.code = code;
            }
        }
        if let Some(title) = data.title {
            book.title = title;
        }
        if let Some(author) = data.author {
            book.author = author;
        }
        if let Some(category) = data.category {
            book.category = category;
        }
        if let Some(price) = data.price {
            book.price = price;
        }
        if data.description.is_some() {
            book.description = data.description;
        }
        book.updated_at = self.clock.now();

        self.repository.update_book_details(&book).await?;

        if let Some(total) = data.total_copies {
            if total != book.total_copies {
                self.repository.resize_book(id, total).await?;
            }
        }

        tracing::info!("Book updated: {}", id);
        self.get_book(id).await
    }

    pub async fn delete_book(&self, actor: Actor, id: Uuid) -> AppResult<()> {
        actor.require_admin()?;
        if !self.repository.soft_delete_book(id).await? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        tracing::info!("Book deleted: {}", id);
        Ok(())
    }
}
