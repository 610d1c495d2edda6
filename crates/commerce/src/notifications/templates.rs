//! Askama templates for each notification.

use askama::Template;

use super::{EmailError, Notification, OutgoingEmail};
use crate::ledger::StockAdjustment;
use crate::models::{Order, ShopSettings};

struct LineView {
    name: String,
    quantity: u32,
    line_total: String,
}

struct ShortfallView {
    product_id: String,
    requested: u32,
    available: u32,
    shortfall: u32,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    shop_name: &'a str,
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [LineView],
    subtotal: &'a str,
    shipping: &'a str,
    total: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    shop_name: &'a str,
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [LineView],
    subtotal: &'a str,
    shipping: &'a str,
    total: &'a str,
}

#[derive(Template)]
#[template(path = "email/shipping_update.html")]
struct ShippingUpdateHtml<'a> {
    shop_name: &'a str,
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [LineView],
}

#[derive(Template)]
#[template(path = "email/shipping_update.txt")]
struct ShippingUpdateText<'a> {
    shop_name: &'a str,
    customer_name: &'a str,
    order_number: &'a str,
    items: &'a [LineView],
}

#[derive(Template)]
#[template(path = "email/oversold_alert.txt")]
struct OversoldAlertText<'a> {
    order_number: &'a str,
    lines: &'a [ShortfallView],
}

fn line_views(order: &Order) -> Vec<LineView> {
    order
        .items
        .iter()
        .map(|item| LineView {
            name: item.product_name.clone(),
            quantity: item.quantity,
            line_total: item.line_total().display(&order.currency),
        })
        .collect()
}

fn confirmation(order: &Order, shop: &ShopSettings) -> Result<OutgoingEmail, EmailError> {
    let items = line_views(order);
    let subtotal = order.subtotal.display(&order.currency);
    let shipping = order.shipping_cost.display(&order.currency);
    let total = order.display_total();

    let html = OrderConfirmationHtml {
        shop_name: &shop.shop_name,
        customer_name: &order.customer.name,
        order_number: order.order_number.as_str(),
        items: &items,
        subtotal: &subtotal,
        shipping: &shipping,
        total: &total,
    }
    .render()?;
    let text = OrderConfirmationText {
        shop_name: &shop.shop_name,
        customer_name: &order.customer.name,
        order_number: order.order_number.as_str(),
        items: &items,
        subtotal: &subtotal,
        shipping: &shipping,
        total: &total,
    }
    .render()?;

    Ok(OutgoingEmail {
        to: order.customer.email.clone(),
        subject: format!("Order Confirmed - {}", order.order_number),
        text,
        html: Some(html),
    })
}

fn shipping_update(order: &Order, shop: &ShopSettings) -> Result<OutgoingEmail, EmailError> {
    let items = line_views(order);

    let html = ShippingUpdateHtml {
        shop_name: &shop.shop_name,
        customer_name: &order.customer.name,
        order_number: order.order_number.as_str(),
        items: &items,
    }
    .render()?;
    let text = ShippingUpdateText {
        shop_name: &shop.shop_name,
        customer_name: &order.customer.name,
        order_number: order.order_number.as_str(),
        items: &items,
    }
    .render()?;

    Ok(OutgoingEmail {
        to: order.customer.email.clone(),
        subject: format!("Your Order Has Shipped - {}", order.order_number),
        text,
        html: Some(html),
    })
}

fn oversold_alert(
    order: &Order,
    to: &print_shop_core::Email,
    shortfalls: &[StockAdjustment],
) -> Result<OutgoingEmail, EmailError> {
    let lines: Vec<ShortfallView> = shortfalls
        .iter()
        .map(|adj| ShortfallView {
            product_id: adj.product_id.to_string(),
            requested: adj.requested,
            available: adj.before,
            shortfall: adj.shortfall(),
        })
        .collect();

    let text = OversoldAlertText {
        order_number: order.order_number.as_str(),
        lines: &lines,
    }
    .render()?;

    Ok(OutgoingEmail {
        to: to.clone(),
        subject: format!("Oversold stock on order {}", order.order_number),
        text,
        html: None,
    })
}

/// Render a notification into an email.
///
/// # Errors
///
/// Returns `EmailError::Template` if a template fails to render.
pub fn render(notification: &Notification) -> Result<OutgoingEmail, EmailError> {
    match notification {
        Notification::OrderConfirmation { order, shop } => confirmation(order, shop),
        Notification::ShippingUpdate { order, shop } => shipping_update(order, shop),
        Notification::OversoldAlert {
            order,
            to,
            shortfalls,
        } => oversold_alert(order, to, shortfalls),
    }
}
