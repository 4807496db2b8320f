/// A single image card
///
/// The card always occupies the rectangle the masonry layout gave it, so
/// columns keep their shape while thumbnails are still unmounted.
use iced::widget::image::Handle;
use iced::widget::{
    button, checkbox, column, container, horizontal_space, image, row, stack, text, Space,
};
use iced::{alignment, Alignment, Background, Border, Color, ContentFit, Element, Length, Theme};

use crate::feed::card::{
    card_content, header_overlays, ingestion_badge, CardContent, CardRect, HEADER_OFFSET,
};
use crate::feed::view::FeedAction;
use crate::state::data::{Item, UserId};
use crate::state::preferences::HiddenKind;
use crate::state::query::Reaction;
use crate::Message;

/// How a card should be drawn
#[derive(Debug, Clone, Copy)]
pub struct CardOptions {
    pub mounted: bool,
    pub selected: bool,
    pub viewer: Option<UserId>,
    pub show_nsfw: bool,
}

pub fn view<'a>(item: &'a Item, rect: &CardRect, options: CardOptions) -> Element<'a, Message> {
    let body: Element<'a, Message> = if options.mounted {
        match card_content(item, options.show_nsfw) {
            CardContent::Image { path } => image(Handle::from_path(path))
                .content_fit(ContentFit::Cover)
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            CardContent::Placeholder { color: [r, g, b] } => {
                placeholder(Color::from_rgb8(r, g, b))
            }
        }
    } else {
        Space::new(Length::Fill, Length::Fill).into()
    };

    // The card height only reserves header room for landscape images
    let content: Element<'a, Message> = if header_overlays(item.width, item.height) {
        let header = container(header(item, options))
            .width(Length::Fill)
            .style(|_theme: &Theme| container::Style {
                background: Some(Background::Color(Color {
                    a: 0.6,
                    ..Color::BLACK
                })),
                ..Default::default()
            });
        stack![body, header].into()
    } else {
        column![header(item, options), body].into()
    };

    let selected = options.selected;
    container(content)
        .width(Length::Fixed(rect.width))
        .height(Length::Fixed(rect.height))
        .clip(true)
        .style(move |theme: &Theme| {
            let base = container::rounded_box(theme);
            if selected {
                container::Style {
                    border: Border {
                        color: theme.palette().primary,
                        width: 2.0,
                        radius: 4.0.into(),
                    },
                    ..base
                }
            } else {
                base
            }
        })
        .into()
}

fn header<'a>(item: &'a Item, options: CardOptions) -> Element<'a, Message> {
    let id = item.id;

    let mut header = row![
        checkbox("", options.selected)
            .on_toggle(move |checked| Message::Feed(FeedAction::ToggleCheckbox { id, checked })),
        text(&item.username).size(14),
    ]
    .spacing(6)
    .align_y(Alignment::Center);

    if let Some(badge) = ingestion_badge(item, options.viewer) {
        header = header.push(text(badge).size(11).color(Color::from_rgb(0.95, 0.7, 0.3)));
    }

    header = header
        .push(horizontal_space())
        .push(text(format!("{} reactions", item.reactions.total())).size(11))
        .push(small_button("Variant", Message::Feed(FeedAction::RequestVariant(id))));

    match options.viewer {
        Some(viewer) if viewer == item.user_id => {
            let label = if item.nsfw { "Mark SFW" } else { "Mark NSFW" };
            header = header.push(small_button(label, Message::SetNsfw(id, !item.nsfw)));
        }
        Some(_) => {
            header = header
                .push(small_button("Like", Message::React(id, Reaction::Like)))
                .push(small_button("Hide", Message::Hide(HiddenKind::Image, id)))
                .push(small_button("Hide user", Message::Hide(HiddenKind::User, item.user_id)));
        }
        None => {}
    }

    container(header)
        .height(Length::Fixed(HEADER_OFFSET as f32))
        .padding([0, 8])
        .align_y(alignment::Vertical::Center)
        .into()
}

fn small_button(label: &str, message: Message) -> Element<'_, Message> {
    button(text(label).size(11))
        .on_press(message)
        .padding([2, 6])
        .style(button::secondary)
        .into()
}

fn placeholder<'a>(color: Color) -> Element<'a, Message> {
    container(Space::new(Length::Fill, Length::Fill))
        .width(Length::Fill)
        .height(Length::Fill)
        .style(move |_theme: &Theme| container::Style {
            background: Some(Background::Color(color)),
            ..Default::default()
        })
        .into()
}
